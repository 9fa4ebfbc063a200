use crate::config::PickerStyle;
use crate::input::Action;
use crate::profile::Profile;
use crate::table::match_labels_summary;

pub const PICKER_HEADERS: [&str; 5] = ["Name", "Profile", "Image", "Namespace", "MatchLabels"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickerOutcome {
    Selected(String),
    Cancelled,
}

/// State of the interactive profile picker.
#[derive(Debug, Clone)]
pub struct ProfilePicker {
    rows: Vec<Vec<String>>,
    selected: usize,
    page_size: usize,
    style: PickerStyle,
    outcome: Option<PickerOutcome>,
}

impl ProfilePicker {
    pub fn new<'a>(profiles: impl IntoIterator<Item = &'a Profile>, style: PickerStyle) -> Self {
        let rows = profiles
            .into_iter()
            .map(|profile| {
                vec![
                    profile.name.clone(),
                    profile.source.to_string(),
                    profile.image.clone().unwrap_or_default(),
                    profile.namespace.clone().unwrap_or_default(),
                    match_labels_summary(profile),
                ]
            })
            .collect();

        Self {
            rows,
            selected: 0,
            page_size: 10,
            style,
            outcome: None,
        }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn selected_index(&self) -> Option<usize> {
        (!self.rows.is_empty()).then_some(self.selected)
    }

    pub fn style(&self) -> PickerStyle {
        self.style
    }

    pub fn outcome(&self) -> Option<&PickerOutcome> {
        self.outcome.as_ref()
    }

    pub fn set_page_size(&mut self, rows: usize) {
        self.page_size = rows.max(1);
    }

    pub fn apply_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.outcome = Some(PickerOutcome::Cancelled),
            Action::Down => self.move_selection(1),
            Action::Up => self.move_selection(-1),
            Action::PageDown => self.move_selection(self.page_step()),
            Action::PageUp => self.move_selection(-self.page_step()),
            Action::Top => self.selected = 0,
            Action::Bottom => self.selected = self.rows.len().saturating_sub(1),
            Action::Select => {
                if let Some(row) = self.rows.get(self.selected) {
                    self.outcome = Some(PickerOutcome::Selected(row[0].clone()));
                }
            }
        }
    }

    fn page_step(&self) -> isize {
        self.page_size.saturating_sub(1).max(1) as isize
    }

    fn move_selection(&mut self, delta: isize) {
        let last = self.rows.len().saturating_sub(1);
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }
}
