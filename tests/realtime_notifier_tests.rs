//! Scripted progress through the notifier facade, under paused time
use std::time::Duration;

use mealplan_progress_lib::application::{ConnectionState, RealtimeNotifier};
use mealplan_progress_lib::domain::{JobId, NotifierMessageKind, OutboundEvent};
use mealplan_progress_lib::infrastructure::config::{NotifierConfig, ProgressConfig};

fn connected() -> RealtimeNotifier {
    let notifier = RealtimeNotifier::new(NotifierConfig::default(), ProgressConfig::default());
    notifier.connect(None);
    notifier
}

fn request_progress(id: &str, total_meals: u32) -> OutboundEvent {
    OutboundEvent::RequestProgress {
        meal_plan_id: JobId::new(id),
        total_meals,
    }
}

#[tokio::test(start_paused = true)]
async fn steps_arrive_at_their_offsets() {
    let notifier = connected();
    let mut messages = notifier.subscribe();
    notifier.send_message(request_progress("mp-1", 21)).unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(notifier.last_message().is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let first = messages.borrow_and_update().clone().unwrap();
    assert_eq!(first.kind, NotifierMessageKind::MealPlanProgress);
    assert_eq!(first.meal_plan_id, Some(JobId::new("mp-1")));
    assert_eq!(first.total_meals, 21);
    assert!(first.progress < 88);

    let mut seen = vec![first.progress];
    for _ in 0..4 {
        messages.changed().await.unwrap();
        let message = messages.borrow_and_update().clone().unwrap();
        seen.push(message.progress);
    }
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");

    let last = notifier.last_message().unwrap();
    assert_eq!(last.progress, 88);
    assert_eq!(last.completed_meals, 18);
    assert!(last.progress < 100);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_steps() {
    let notifier = connected();
    notifier.send_message(request_progress("mp-2", 28)).unwrap();

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(notifier.last_message().is_some());

    notifier.disconnect();
    notifier.disconnect();
    assert_eq!(notifier.state(), ConnectionState::Disconnected);
    assert!(notifier.last_message().is_none());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(notifier.last_message().is_none());
}

#[tokio::test(start_paused = true)]
async fn new_request_replaces_the_old_schedule() {
    let notifier = connected();
    notifier.send_message(request_progress("mp-old", 28)).unwrap();
    tokio::time::sleep(Duration::from_millis(2_100)).await;

    notifier.send_message(request_progress("mp-new", 12)).unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let last = notifier.last_message().unwrap();
    assert_eq!(last.meal_plan_id, Some(JobId::new("mp-new")));
    assert_eq!(last.total_meals, 12);
    assert_eq!(last.progress, 88);
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_disconnect_accepts_requests() {
    let notifier = connected();
    notifier.disconnect();
    assert!(notifier.send_message(OutboundEvent::Ping).is_err());

    notifier.connect(None);
    notifier.send_message(request_progress("mp-3", 9)).unwrap();
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(notifier.last_message().unwrap().progress, 88);
}
