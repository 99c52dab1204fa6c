//! Transaction helpers.
//!
//! [`Db`](crate::Db) works over any [`Executor`](crate::Executor), transactions
//! included, so model operations compose with or without one. The macros below take
//! care of commit and rollback:
//!
//! ```ignore
//! let mut client = pool.get().await?;
//! pgmap::transaction!(&mut client, tx, {
//!     let db = pgmap::Db::new(&tx);
//!     db.insert(&mut user).await?;
//!     db.insert(&mut profile).await?;
//!     Ok(())
//! })?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

static SAVEPOINT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Runs `$body` inside a transaction: commit on `Ok`, rollback on `Err`.
///
/// The body must evaluate to `pgmap::OrmResult<T>`. A failed rollback is folded into
/// the returned error.
#[macro_export]
macro_rules! transaction {
    ($client:expr, $tx:ident, $body:block) => {{
        #[allow(unused_mut)]
        let mut $tx = ($client)
            .transaction()
            .await
            .map_err($crate::OrmError::from_db_error)?;

        let __pgmap_result = async { $body }.await;
        match __pgmap_result {
            Ok(value) => {
                $tx.commit()
                    .await
                    .map_err($crate::OrmError::from_db_error)?;
                Ok(value)
            }
            Err(error) => match $tx.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::OrmError::Other(format!(
                    "{error} (rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
}

/// Runs `$body` inside a savepoint of an open transaction.
///
/// Released on `Ok`, rolled back to on `Err`; the outer transaction stays usable
/// either way. Without a name, a unique one is generated.
#[macro_export]
macro_rules! savepoint {
    ($tx:expr, $name:expr, $sp:ident, $body:block) => {{
        #[allow(unused_mut)]
        let mut $sp = ($tx)
            .savepoint($name)
            .await
            .map_err($crate::OrmError::from_db_error)?;

        let __pgmap_result = async { $body }.await;
        match __pgmap_result {
            Ok(value) => {
                $sp.commit()
                    .await
                    .map_err($crate::OrmError::from_db_error)?;
                Ok(value)
            }
            Err(error) => match $sp.rollback().await {
                Ok(()) => Err(error),
                Err(rollback_err) => Err($crate::OrmError::Other(format!(
                    "{error} (savepoint rollback failed: {rollback_err})"
                ))),
            },
        }
    }};
    ($tx:expr, $sp:ident, $body:block) => {{
        let __pgmap_sp_name = $crate::transaction::__next_savepoint_name();
        $crate::savepoint!($tx, &__pgmap_sp_name, $sp, $body)
    }};
}

#[doc(hidden)]
pub fn __next_savepoint_name() -> String {
    let n = SAVEPOINT_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("pgmap_sp_{n}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savepoint_names_are_unique() {
        let a = __next_savepoint_name();
        let b = __next_savepoint_name();
        assert_ne!(a, b);
        assert!(a.starts_with("pgmap_sp_"));
    }
}
