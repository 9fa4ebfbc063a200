use std::fmt::{Display, Formatter};

use crate::resolver::ResolvedProfile;

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct TargetRef {
    pub namespace: String,
    pub name: String,
}

impl TargetRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for TargetRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Phase {
    Pending,
    Running,
    Terminated,
    Gone,
}

impl Phase {
    pub fn title(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Terminated => "Terminated",
            Self::Gone => "Gone",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// One injected debug container and what was last observed about it.
#[derive(Debug, Clone)]
pub struct DebugSession {
    pub target: TargetRef,
    pub profile: ResolvedProfile,
    pub container_name: String,
    pub phase: Phase,
}

impl DebugSession {
    pub fn new(target: TargetRef, profile: ResolvedProfile, container_name: String) -> Self {
        Self {
            target,
            profile,
            container_name,
            phase: Phase::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Phase, TargetRef};

    #[test]
    fn target_renders_namespace_and_name() {
        assert_eq!(TargetRef::new("team-a", "web-1").to_string(), "team-a/web-1");
        assert_eq!(Phase::Terminated.to_string(), "Terminated");
    }
}
