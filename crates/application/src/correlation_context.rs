//! Task-scoped correlation identifier binding.
//!
//! A binding lives in a `tokio` task-local slot that only exists inside
//! [`CorrelationContext::run_scoped`] (or its sync twin). Spawned tasks start
//! unbound; use [`CorrelationContext::propagate`] to carry the current id
//! into them explicitly.

use std::cell::RefCell;
use std::future::Future;

use pipeaudit_core::{AppError, AppResult, CorrelationId};

tokio::task_local! {
    static CURRENT_CORRELATION_ID: RefCell<Option<CorrelationId>>;
}

/// Accessors for the correlation id bound to the running task.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationContext;

impl CorrelationContext {
    /// Returns the id bound to the running task, if any.
    #[must_use]
    pub fn current() -> Option<CorrelationId> {
        CURRENT_CORRELATION_ID
            .try_with(|slot| *slot.borrow())
            .ok()
            .flatten()
    }

    /// Binds `correlation_id` in the innermost scope; `None` clears it.
    pub fn set(correlation_id: Option<CorrelationId>) -> AppResult<()> {
        CURRENT_CORRELATION_ID
            .try_with(|slot| {
                *slot.borrow_mut() = correlation_id;
            })
            .map_err(|_| {
                AppError::Correlation(
                    "no correlation scope is active for the running task".to_owned(),
                )
            })
    }

    /// Clears the binding in the innermost scope.
    pub fn clear() -> AppResult<()> {
        Self::set(None)
    }

    /// Generates a fresh id, binds it in the innermost scope and returns it.
    pub fn generate() -> AppResult<CorrelationId> {
        let correlation_id = CorrelationId::new();
        Self::set(Some(correlation_id))?;
        Ok(correlation_id)
    }

    /// Runs `future` with `correlation_id` bound.
    ///
    /// The previous binding, including no binding at all, is visible again once
    /// the future completes, returns an error, or unwinds.
    pub async fn run_scoped<F>(correlation_id: Option<CorrelationId>, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_CORRELATION_ID
            .scope(RefCell::new(correlation_id), future)
            .await
    }

    /// Runs `operation` synchronously with `correlation_id` bound.
    pub fn run_scoped_sync<R>(
        correlation_id: Option<CorrelationId>,
        operation: impl FnOnce() -> R,
    ) -> R {
        CURRENT_CORRELATION_ID.sync_scope(RefCell::new(correlation_id), operation)
    }

    /// Wraps `future` so it runs with the caller's current binding.
    ///
    /// Intended for work handed to `tokio::spawn`, which otherwise starts unbound.
    pub fn propagate<F>(future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        Self::run_scoped(Self::current(), future)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use pipeaudit_core::{AppError, CorrelationId};

    use super::CorrelationContext;

    #[tokio::test]
    async fn current_is_absent_outside_any_scope() {
        assert_eq!(CorrelationContext::current(), None);
        assert!(matches!(
            CorrelationContext::set(Some(CorrelationId::new())),
            Err(AppError::Correlation(_))
        ));
    }

    #[tokio::test]
    async fn generate_binds_and_returns_the_id() {
        CorrelationContext::run_scoped(None, async {
            let generated = CorrelationContext::generate();
            assert!(generated.is_ok());
            assert_eq!(CorrelationContext::current(), generated.ok());
        })
        .await;
    }

    #[tokio::test]
    async fn set_none_is_equivalent_to_clear() {
        let correlation_id = CorrelationId::new();
        CorrelationContext::run_scoped(Some(correlation_id), async {
            assert_eq!(CorrelationContext::current(), Some(correlation_id));
            assert!(CorrelationContext::set(None).is_ok());
            assert_eq!(CorrelationContext::current(), None);
            assert!(CorrelationContext::set(Some(correlation_id)).is_ok());
            assert!(CorrelationContext::clear().is_ok());
            assert_eq!(CorrelationContext::current(), None);
        })
        .await;
    }

    #[tokio::test]
    async fn nested_scope_restores_outer_binding_after_error() {
        let outer = CorrelationId::new();
        let inner = CorrelationId::new();

        CorrelationContext::run_scoped(Some(outer), async move {
            let result: Result<(), AppError> =
                CorrelationContext::run_scoped(Some(inner), async move {
                    assert_eq!(CorrelationContext::current(), Some(inner));
                    Err(AppError::Validation("boom".to_owned()))
                })
                .await;

            assert!(matches!(result, Err(AppError::Validation(_))));
            assert_eq!(CorrelationContext::current(), Some(outer));
        })
        .await;

        assert_eq!(CorrelationContext::current(), None);
    }

    #[tokio::test]
    async fn inner_set_does_not_leak_into_outer_scope() {
        let outer = CorrelationId::new();
        CorrelationContext::run_scoped(Some(outer), async move {
            CorrelationContext::run_scoped(None, async {
                assert_eq!(CorrelationContext::current(), None);
                assert!(CorrelationContext::generate().is_ok());
            })
            .await;
            assert_eq!(CorrelationContext::current(), Some(outer));
        })
        .await;
    }

    #[test]
    fn sync_scope_restores_binding_after_panic() {
        let outer = CorrelationId::new();
        CorrelationContext::run_scoped_sync(Some(outer), || {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                CorrelationContext::run_scoped_sync(Some(CorrelationId::new()), || {
                    panic!("stage failed");
                })
            }));
            assert!(outcome.is_err());
            assert_eq!(CorrelationContext::current(), Some(outer));
        });
        assert_eq!(CorrelationContext::current(), None);
    }

    #[tokio::test]
    async fn spawned_tasks_start_unbound_unless_propagated() {
        let correlation_id = CorrelationId::new();
        CorrelationContext::run_scoped(Some(correlation_id), async move {
            let unbound = tokio::spawn(async { CorrelationContext::current() }).await;
            assert_eq!(unbound.ok().flatten(), None);

            let propagated =
                tokio::spawn(CorrelationContext::propagate(async {
                    CorrelationContext::current()
                }))
                .await;
            assert_eq!(propagated.ok().flatten(), Some(correlation_id));
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_scopes_are_isolated() {
        let mut handles = Vec::new();
        for _ in 0..16 {
            let correlation_id = CorrelationId::new();
            handles.push(tokio::spawn(CorrelationContext::run_scoped(
                Some(correlation_id),
                async move {
                    for _ in 0..10 {
                        tokio::task::yield_now().await;
                        if CorrelationContext::current() != Some(correlation_id) {
                            return false;
                        }
                    }
                    true
                },
            )));
        }

        for handle in handles {
            assert_eq!(handle.await.ok(), Some(true));
        }
    }
}
