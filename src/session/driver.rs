use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::config::ProctoringConfig;

use super::client::AttemptApi;
use super::controller::SessionController;
use super::integrity::{InputAction, KeyChord};
use super::snapshot::SnapshotStore;
use super::SessionError;

/// Signals forwarded from the host UI into a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    GrantCamera,
    EnterFullscreen,
    Begin,
    Answer { question_id: i64, option: u8 },
    JumpTo(usize),
    Next,
    Previous,
    VisibilityHidden,
    WindowBlur,
    Escape,
    Key(KeyChord),
    Input(InputAction),
    Offline,
    Online,
    CameraEnded,
    Submit,
    RetrySubmit,
    Leave,
}

/// Runs the session until it terminates or errors. Loads the session first
/// when needed; a load failure is returned, and a submission restored by the
/// load is resent once. Dropping every sender is treated as leaving the page.
pub async fn drive<A, S>(
    controller: &mut SessionController<A, S>,
    config: &ProctoringConfig,
    mut events: mpsc::Receiver<HostEvent>,
) -> Result<(), SessionError>
where
    A: AttemptApi,
    S: SnapshotStore,
{
    if *controller.state() == super::SessionState::Loading {
        controller.load().await?;
        if controller.pending().is_some() {
            report(controller.retry_submit().await);
        }
    }

    let start = Instant::now();
    let mut ticks = interval_at(start + config.tick_interval, config.tick_interval);
    let mut fullscreen_checks = interval_at(
        start + config.fullscreen_check_interval,
        config.fullscreen_check_interval,
    );
    let mut face_polls = interval_at(start + config.face_poll_interval, config.face_poll_interval);
    for interval in [&mut ticks, &mut fullscreen_checks, &mut face_polls] {
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    }

    let mut timing_started = false;
    while !controller.is_finished() {
        if !timing_started && controller.state().is_active() {
            // the countdown runs from consent, not from load
            timing_started = true;
            ticks.reset();
            fullscreen_checks.reset();
            face_polls.reset();
        }

        tokio::select! {
            biased;

            event = events.recv() => match event {
                Some(event) => handle(controller, event).await,
                None => controller.leave(),
            },
            _ = ticks.tick() => report(controller.tick().await),
            _ = fullscreen_checks.tick() => controller.check_fullscreen().await,
            _ = face_polls.tick() => report(controller.poll_faces().await),
        }
    }

    Ok(())
}

async fn handle<A, S>(controller: &mut SessionController<A, S>, event: HostEvent)
where
    A: AttemptApi,
    S: SnapshotStore,
{
    let result = match event {
        HostEvent::GrantCamera => controller.grant_camera().await,
        HostEvent::EnterFullscreen => controller.enter_fullscreen().await,
        HostEvent::Begin => controller.begin(),
        HostEvent::Answer {
            question_id,
            option,
        } => controller.select_answer(question_id, option),
        HostEvent::JumpTo(index) => controller.jump_to(index),
        HostEvent::Next => controller.next(),
        HostEvent::Previous => controller.previous(),
        HostEvent::VisibilityHidden | HostEvent::WindowBlur => controller.focus_lost().await,
        HostEvent::Escape => {
            controller.escape_pressed().await;
            Ok(())
        }
        HostEvent::Key(chord) => {
            controller.on_key(&chord);
            Ok(())
        }
        HostEvent::Input(action) => {
            controller.on_input(action);
            Ok(())
        }
        HostEvent::Offline => {
            controller.network_offline();
            Ok(())
        }
        HostEvent::Online => {
            controller.network_online();
            Ok(())
        }
        HostEvent::CameraEnded => {
            controller.camera_lost();
            Ok(())
        }
        HostEvent::Submit => controller.submit().await,
        HostEvent::RetrySubmit => controller.retry_submit().await,
        HostEvent::Leave => {
            controller.leave();
            Ok(())
        }
    };
    report(result);
}

fn report(result: Result<(), SessionError>) {
    if let Err(e) = result {
        tracing::warn!(error = %e, "Session action rejected");
    }
}
