//! Scoped units of work.

use tracing::warn;

use ember_common::error::EmberResult;

use crate::factory::{SessionFactory, SessionOptions};
use crate::session::Session;

/// Runs `work` in a fresh session.
///
/// The session commits when `work` succeeds and rolls back when it fails;
/// it is closed either way. A failing rollback is logged and the error
/// from `work` is returned.
///
/// # Example
///
/// ```rust,ignore
/// let count = with_session(&factory, |session| {
///     session.insert("insertUser", Some(&user))
/// })?;
/// ```
pub fn with_session<S, F, T>(factory: &S, work: F) -> EmberResult<T>
where
    S: SessionFactory + ?Sized,
    F: FnOnce(&mut Session) -> EmberResult<T>,
{
    with_session_options(factory, SessionOptions::default(), work)
}

/// Runs `work` in a fresh session opened with explicit options.
pub fn with_session_options<S, F, T>(
    factory: &S,
    options: SessionOptions,
    work: F,
) -> EmberResult<T>
where
    S: SessionFactory + ?Sized,
    F: FnOnce(&mut Session) -> EmberResult<T>,
{
    let mut session = factory.open_session_with(options)?;
    match work(&mut session) {
        Ok(value) => {
            let committed = session.commit(false);
            session.close();
            committed.map(|()| value)
        }
        Err(e) => {
            if let Err(rollback_err) = session.rollback(false) {
                warn!(error = %rollback_err, "rollback after failed unit of work failed");
            }
            session.close();
            Err(e)
        }
    }
}
