use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use std::fmt::Write as _;

use crate::profile::Profile;

const NARROW_HEADERS: [&str; 2] = ["Name", "Profile"];
const WIDE_HEADERS: [&str; 5] = ["Name", "Profile", "Image", "Namespace", "MatchLabels"];
const COLUMN_GAP: &str = "  ";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProfileTable {
    pub headers: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl ProfileTable {
    pub fn build<'a>(profiles: impl IntoIterator<Item = &'a Profile>, wide: bool) -> Self {
        let headers = if wide {
            WIDE_HEADERS.to_vec()
        } else {
            NARROW_HEADERS.to_vec()
        };
        let rows = profiles
            .into_iter()
            .map(|profile| {
                let mut row = vec![profile.name.clone(), profile.source.to_string()];
                if wide {
                    row.push(profile.image.clone().unwrap_or_default());
                    row.push(profile.namespace.clone().unwrap_or_default());
                    row.push(match_labels_summary(profile));
                }
                row
            })
            .collect();

        Self { headers, rows }
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(index, header)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(index))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Renders aligned columns; `colored` styles the header and first column.
    pub fn render(&self, colored: bool) -> String {
        let widths = self.widths();
        let mut out = String::new();

        let header = self
            .headers
            .iter()
            .zip(&widths)
            .map(|(header, width)| {
                let cell = format!("{header:<width$}");
                if colored {
                    cell.as_str().green().underlined().to_string()
                } else {
                    cell
                }
            })
            .collect::<Vec<_>>()
            .join(COLUMN_GAP);
        let _ = writeln!(out, "{}", header.trim_end());

        for row in &self.rows {
            let line = row
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(index, (cell, width))| {
                    let cell = format!("{cell:<width$}");
                    if colored && index == 0 {
                        cell.as_str().yellow().to_string()
                    } else {
                        cell
                    }
                })
                .collect::<Vec<_>>()
                .join(COLUMN_GAP);
            let _ = writeln!(out, "{}", line.trim_end());
        }

        out
    }
}

pub fn print_profiles(profiles: &[Profile], wide: bool) {
    let table = ProfileTable::build(profiles, wide);
    print!("{}", table.render(std::io::stdout().is_tty()));
}

pub fn match_labels_summary(profile: &Profile) -> String {
    profile
        .match_labels
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(", ")
}
