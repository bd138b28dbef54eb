use tandem_core::{Handle, IsolationLevel, TandemResult};
use tracing::debug;

/// Session settings that every handle of the session must share.
///
/// Setters apply to the handle currently in use, then remember the value so
/// that handles created later can be initialized the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParameters {
    auto_commit: Option<bool>,
    read_only: Option<bool>,
    isolation: Option<IsolationLevel>,
    set_statements: Vec<String>,
}

impl SessionParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Auto-commit is on unless it was switched off.
    pub fn is_auto_commit(&self) -> bool {
        self.auto_commit.unwrap_or(true)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.unwrap_or(false)
    }

    pub fn transaction_isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// Recorded `SET` statements, oldest first.
    pub fn set_statements(&self) -> &[String] {
        &self.set_statements
    }

    pub fn set_auto_commit(&mut self, current: Option<&Handle>, auto_commit: bool) -> TandemResult<()> {
        if let Some(handle) = current {
            handle.set_auto_commit(auto_commit)?;
        }
        self.auto_commit = Some(auto_commit);
        Ok(())
    }

    pub fn set_read_only(&mut self, current: Option<&Handle>, read_only: bool) -> TandemResult<()> {
        if let Some(handle) = current {
            handle.set_read_only(read_only)?;
        }
        self.read_only = Some(read_only);
        Ok(())
    }

    pub fn set_transaction_isolation(
        &mut self,
        current: Option<&Handle>,
        level: IsolationLevel,
    ) -> TandemResult<()> {
        if let Some(handle) = current {
            handle.set_transaction_isolation(level)?;
        }
        self.isolation = Some(level);
        Ok(())
    }

    pub fn add_set_statement(&mut self, sql: impl Into<String>) {
        self.set_statements.push(sql.into());
    }

    /// Bring a freshly created handle in line with the session.
    pub fn initialize(&self, handle: &Handle) -> TandemResult<()> {
        debug!(kind = %handle.kind(), "initializing handle");
        if let Some(auto_commit) = self.auto_commit {
            handle.set_auto_commit(auto_commit)?;
        }
        if let Some(level) = self.isolation {
            handle.set_transaction_isolation(level)?;
        }
        if let Some(read_only) = self.read_only {
            handle.set_read_only(read_only)?;
        }
        for sql in &self.set_statements {
            debug!(kind = %handle.kind(), sql = %sql, "replaying session parameter");
            handle.execute(sql)?;
        }
        Ok(())
    }
}
