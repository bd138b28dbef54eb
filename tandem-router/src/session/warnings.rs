use tandem_core::Warning;

/// How many accumulated warnings are kept and scanned for duplicates.
pub const MAX_WARNINGS: usize = 100;

/// Warnings collected from handles the session has used.
///
/// A warning already among the kept ones is skipped, and nothing is kept
/// past [`MAX_WARNINGS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings {
    kept: Vec<Warning>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&mut self, warning: Warning) {
        if self.kept.len() >= MAX_WARNINGS || self.kept.contains(&warning) {
            return;
        }
        self.kept.push(warning);
    }

    pub fn save_all(&mut self, warnings: impl IntoIterator<Item = Warning>) {
        for warning in warnings {
            self.save(warning);
        }
    }

    pub fn as_slice(&self) -> &[Warning] {
        &self.kept
    }

    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    pub fn clear(&mut self) {
        self.kept.clear();
    }
}
