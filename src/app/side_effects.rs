use sqlx::{PgConnection, Postgres, Transaction};
use tracing::warn;

use crate::error::Result;

/// How a failed side effect affects the action that triggered it.
///
/// Side effects run in their own scope: a savepoint nested in the caller's
/// transaction, or a transaction of their own. `Strict` rolls the scope back
/// and returns the error to the caller. `BestEffort` rolls the scope back, logs
/// the failure and lets the enclosing work continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffectPolicy {
    Strict,
    BestEffort,
}

impl SideEffectPolicy {
    pub async fn settle<T>(
        self,
        label: &'static str,
        scope: Transaction<'_, Postgres>,
        outcome: Result<T>,
    ) -> Result<Option<T>> {
        match outcome {
            Ok(value) => {
                scope.commit().await?;
                Ok(Some(value))
            }
            Err(err) => {
                scope.rollback().await?;
                match self {
                    Self::Strict => Err(err),
                    Self::BestEffort => {
                        warn!(side_effect = label, error = ?err, "best-effort side effect failed");
                        Ok(None)
                    }
                }
            }
        }
    }
}

/// Opens a savepoint on `conn` so a side effect can be settled without
/// disturbing the enclosing transaction.
pub async fn savepoint(conn: &mut PgConnection) -> Result<Transaction<'_, Postgres>> {
    Ok(sqlx::Connection::begin(conn).await?)
}
