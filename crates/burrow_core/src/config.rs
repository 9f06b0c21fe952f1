//! Database configuration.

/// What happens to still-active transactions when a database is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePolicy {
    /// Abort every active transaction.
    #[default]
    AutoAbort,
    /// Commit every active transaction, oldest first.
    AutoCommit,
    /// Refuse to close while any transaction is active.
    Refuse,
}

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether `begin` is allowed at all.
    pub enable_transactions: bool,

    /// Maximum number of simultaneously active transactions.
    pub max_transactions: usize,

    /// Treatment of active transactions at close.
    pub close_policy: ClosePolicy,

    /// Whether to sync the journal after every committed batch.
    pub sync_on_commit: bool,

    /// Whether to create the database directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to error if the database already exists.
    pub error_if_exists: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_transactions: true,
            max_transactions: 1,
            close_policy: ClosePolicy::AutoAbort,
            sync_on_commit: true,
            create_if_missing: true,
            error_if_exists: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether transactions may be started.
    #[must_use]
    pub const fn enable_transactions(mut self, value: bool) -> Self {
        self.enable_transactions = value;
        self
    }

    /// Sets the transaction capacity.
    #[must_use]
    pub const fn max_transactions(mut self, capacity: usize) -> Self {
        self.max_transactions = capacity;
        self
    }

    /// Sets the close policy.
    #[must_use]
    pub const fn close_policy(mut self, policy: ClosePolicy) -> Self {
        self.close_policy = policy;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to error if the database exists.
    #[must_use]
    pub const fn error_if_exists(mut self, value: bool) -> Self {
        self.error_if_exists = value;
        self
    }

    pub(crate) fn validate(&self) -> crate::CoreResult<()> {
        if self.enable_transactions && self.max_transactions == 0 {
            return Err(crate::CoreError::invalid_config(
                "max_transactions must be at least 1 when transactions are enabled",
            ));
        }
        Ok(())
    }
}
