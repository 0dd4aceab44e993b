//! Request controller.
//!
//! Executes the remote calls the presentation layer asks for and emits the results as
//! `AppEvent`s. Each result carries the generation or session it was issued for; deciding
//! whether it is still wanted is left to the receiver.

use crate::api::LicenseApi;
use crate::editor::{execute_save, SaveIntent};
use crate::lifecycle::execute;
use crate::model::{AppEvent, UsageCommand};
use crate::query::Fetch;
use anyhow::Result;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    LoadList(Fetch),
    LoadLicense { session: u64, license_id: i64 },
    Commit { session: u64, command: UsageCommand },
    Save { session: u64, intent: SaveIntent },
    Quit,
}

/// Turn a command into the request future that answers it. `None` for `Quit`.
fn start_request(
    api: &Arc<dyn LicenseApi>,
    cmd: UiCommand,
) -> Option<BoxFuture<'static, AppEvent>> {
    let api = Arc::clone(api);
    let fut = match cmd {
        UiCommand::LoadList(fetch) => async move {
            AppEvent::ListLoaded {
                generation: fetch.generation,
                result: api.list(&fetch.request).await,
            }
        }
        .boxed(),
        UiCommand::LoadLicense {
            session,
            license_id,
        } => async move {
            AppEvent::DetailLoaded {
                session,
                result: api.get(license_id).await,
            }
        }
        .boxed(),
        UiCommand::Commit { session, command } => async move {
            AppEvent::CommitFinished {
                session,
                action: command.action(),
                result: execute(api.as_ref(), &command).await,
            }
        }
        .boxed(),
        UiCommand::Save { session, intent } => async move {
            AppEvent::SaveFinished {
                session,
                result: execute_save(api.as_ref(), &intent).await.map(Box::new),
            }
        }
        .boxed(),
        UiCommand::Quit => return None,
    };
    Some(fut)
}

/// Serve UI commands until `Quit` or until the command channel closes.
///
/// Requests run concurrently; outstanding ones are dropped on quit and their responses
/// are never delivered.
pub(crate) async fn run_controller(
    api: Arc<dyn LicenseApi>,
    event_tx: UnboundedSender<AppEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut in_flight: FuturesUnordered<BoxFuture<'static, AppEvent>> = FuturesUnordered::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                tracing::debug!(?cmd, "ui command");
                match start_request(&api, cmd) {
                    Some(fut) => in_flight.push(fut),
                    None => break,
                }
            }
            Some(event) = in_flight.next(), if !in_flight.is_empty() => {
                // A closed receiver means the UI is gone; nothing left to report to.
                if event_tx.send(event).is_err() {
                    break;
                }
            }
        }
    }

    if !in_flight.is_empty() {
        tracing::debug!(pending = in_flight.len(), "dropping outstanding requests");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{sample_license, FakeApi};
    use crate::error::ApiError;
    use crate::lifecycle::{GrantTerms, LifecycleAction};
    use crate::model::LicenseStatus;
    use crate::query::QueryEngine;
    use tokio::sync::mpsc;

    fn spawn_controller(
        api: FakeApi,
    ) -> (
        mpsc::UnboundedSender<UiCommand>,
        mpsc::UnboundedReceiver<AppEvent>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_controller(Arc::new(api), event_tx, cmd_rx));
        (cmd_tx, event_rx, handle)
    }

    #[tokio::test]
    async fn list_results_carry_their_generation() {
        let api = FakeApi::with_licenses([sample_license(1, LicenseStatus::Assigned)]);
        let (cmd_tx, mut events, handle) = spawn_controller(api);
        let mut engine = QueryEngine::new(25);
        let fetch = engine.refresh();
        cmd_tx.send(UiCommand::LoadList(fetch.clone())).unwrap();

        match events.recv().await.unwrap() {
            AppEvent::ListLoaded { generation, result } => {
                assert_eq!(generation, fetch.generation);
                assert_eq!(result.unwrap().row_count, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn commit_reports_action_and_failure() {
        let api = FakeApi::with_licenses([sample_license(42, LicenseStatus::Assigned)]);
        let (cmd_tx, mut events, handle) = spawn_controller(api);
        let command = LifecycleAction::Apply.command(42, GrantTerms::default());
        cmd_tx
            .send(UiCommand::Commit {
                session: 3,
                command,
            })
            .unwrap();

        match events.recv().await.unwrap() {
            AppEvent::CommitFinished {
                session,
                action,
                result,
            } => {
                assert_eq!(session, 3);
                assert_eq!(action, LifecycleAction::Apply);
                assert!(matches!(result, Err(ApiError::Conflict { .. })));
            }
            other => panic!("unexpected event {other:?}"),
        }
        drop(cmd_tx);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn license_fetch_is_tagged_with_session() {
        let api = FakeApi::default();
        let (cmd_tx, mut events, handle) = spawn_controller(api);
        cmd_tx
            .send(UiCommand::LoadLicense {
                session: 9,
                license_id: 404,
            })
            .unwrap();
        match events.recv().await.unwrap() {
            AppEvent::DetailLoaded { session, result } => {
                assert_eq!(session, 9);
                assert!(matches!(result, Err(ApiError::NotFound { .. })));
            }
            other => panic!("unexpected event {other:?}"),
        }
        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
    }
}
