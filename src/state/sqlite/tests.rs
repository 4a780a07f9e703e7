use super::*;
use crate::testing::{setup_test_store, subscription};
use crate::traits::{HabitStore, NotificationStore};
use chrono::NaiveDate;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn setup_file_store() -> (SqliteStore, tempfile::NamedTempFile) {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let store = SqliteStore::open(db_file.path().to_str().unwrap())
        .await
        .unwrap();
    (store, db_file)
}

fn instance_of(template: &RecurrenceTemplate, due: NaiveDate) -> TaskInstance {
    let mut instance = TaskInstance::one_off(&template.owner_id, &template.title, due);
    instance.template_id = Some(template.id.clone());
    instance.cycle_key = Some(crate::recurrence::cycle_key(due));
    instance
}

#[tokio::test]
async fn test_template_roundtrip_keeps_pattern_and_metrics() {
    let (store, _file) = setup_file_store().await;
    let mut template = RecurrenceTemplate::new(
        "u1",
        "Gym",
        RecurrencePattern::weekly(&[Weekday::Mon, Weekday::Thu]),
    );
    template.reminder_time = NaiveTime::from_hms_opt(7, 30, 0);
    template.metrics = template.metrics.record_miss(date(2024, 3, 4));
    store.insert_template(&template).await.unwrap();

    let loaded = store.get_template(&template.id).await.unwrap().unwrap();
    assert_eq!(loaded.pattern, template.pattern);
    assert_eq!(loaded.reminder_time, NaiveTime::from_hms_opt(7, 30, 0));
    assert_eq!(loaded.metrics, template.metrics);
    assert!(store.get_template("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn test_unique_cycle_rejects_second_insert() {
    let store = setup_test_store().await;
    let template = RecurrenceTemplate::new("u1", "Walk", RecurrencePattern::Daily);
    store.insert_template(&template).await.unwrap();
    let day = date(2024, 3, 1);

    assert!(store
        .insert_instance_if_absent(&instance_of(&template, day))
        .await
        .unwrap());
    assert!(!store
        .insert_instance_if_absent(&instance_of(&template, day))
        .await
        .unwrap());

    // One-off tasks have no template link and never collide.
    let one_off = TaskInstance::one_off("u1", "Call bank", day);
    assert!(store.insert_instance_if_absent(&one_off).await.unwrap());
    let again = TaskInstance::one_off("u1", "Call bank", day);
    assert!(store.insert_instance_if_absent(&again).await.unwrap());

    assert_eq!(store.instances_between("u1", day, day).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_toggle_updates_metrics_and_is_idempotent() {
    let store = setup_test_store().await;
    let template = RecurrenceTemplate::new("u1", "Meditate", RecurrencePattern::Daily);
    store.insert_template(&template).await.unwrap();
    let instance = instance_of(&template, date(2024, 3, 1));
    store.insert_instance_if_absent(&instance).await.unwrap();

    let done = store
        .toggle_instance(&instance.id, true, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(done.changed);
    assert!(done.instance.completed);
    assert!(done.instance.completed_at.is_some());
    assert_eq!(done.metrics.as_ref().unwrap().streak, 1);

    // Same state again: no metric change.
    let repeat = store
        .toggle_instance(&instance.id, true, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(!repeat.changed);
    assert!(repeat.metrics.is_none());
    let template_now = store.get_template(&template.id).await.unwrap().unwrap();
    assert_eq!(template_now.metrics.streak, 1);
    assert_eq!(template_now.metrics.total_completions, 1);

    let undone = store
        .toggle_instance(&instance.id, false, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(undone.changed);
    assert!(!undone.instance.completed);
    assert!(undone.instance.completed_at.is_none());
    let template_now = store.get_template(&template.id).await.unwrap().unwrap();
    assert_eq!(template_now.metrics.streak, 0);
    assert_eq!(template_now.metrics.total_completions, 0);
    assert!(template_now
        .metrics
        .failure_history
        .contains(&date(2024, 3, 1)));
}

#[tokio::test]
async fn test_toggle_unknown_instance_is_none() {
    let store = setup_test_store().await;
    assert!(store
        .toggle_instance("nope", true, Utc::now())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_toggle_one_off_has_no_metrics() {
    let store = setup_test_store().await;
    let task = TaskInstance::one_off("u1", "Pay rent", date(2024, 3, 1));
    store.insert_instance_if_absent(&task).await.unwrap();
    let outcome = store
        .toggle_instance(&task.id, true, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert!(outcome.changed);
    assert!(outcome.metrics.is_none());
}

#[tokio::test]
async fn test_record_misses_charges_once() {
    let store = setup_test_store().await;
    let mut template = RecurrenceTemplate::new("u1", "Journal", RecurrencePattern::Daily);
    template.metrics.streak = 4;
    template.metrics.total_completions = 4;
    store.insert_template(&template).await.unwrap();
    let stale = instance_of(&template, date(2024, 3, 1));
    store.insert_instance_if_absent(&stale).await.unwrap();

    let misses = store.unrecorded_misses("u1", date(2024, 3, 1)).await.unwrap();
    assert_eq!(misses.len(), 1);

    let miss = store
        .record_misses(&stale.id, date(2024, 3, 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(miss.cycle_dates, vec![date(2024, 3, 1)]);
    assert_eq!(miss.metrics.streak, 0);
    assert_eq!(miss.metrics.failure_history.len(), 1);

    assert!(store
        .record_misses(&stale.id, date(2024, 3, 1))
        .await
        .unwrap()
        .is_none());
    assert!(store
        .unrecorded_misses("u1", date(2024, 3, 1))
        .await
        .unwrap()
        .is_empty());

    // The stale instance is still pending.
    let pending = store.pending_instance(&template.id).await.unwrap().unwrap();
    assert_eq!(pending.id, stale.id);
    assert_eq!(pending.misses_through, Some(date(2024, 3, 1)));
}

#[tokio::test]
async fn test_record_misses_covers_cycles_without_instances() {
    let store = setup_test_store().await;
    let template = RecurrenceTemplate::new("u1", "Journal", RecurrencePattern::Daily);
    store.insert_template(&template).await.unwrap();
    let stale = instance_of(&template, date(2024, 3, 1));
    store.insert_instance_if_absent(&stale).await.unwrap();
    // Mar 3 has its own (completed) instance and is not charged here.
    let mut done = instance_of(&template, date(2024, 3, 3));
    done.completed = true;
    store.insert_instance_if_absent(&done).await.unwrap();

    let miss = store
        .record_misses(&stale.id, date(2024, 3, 4))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        miss.cycle_dates,
        vec![date(2024, 3, 1), date(2024, 3, 2), date(2024, 3, 4)]
    );
    assert_eq!(miss.metrics.failure_history.len(), 3);

    // Only the new day is charged on the next sweep.
    let next = store
        .record_misses(&stale.id, date(2024, 3, 5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.cycle_dates, vec![date(2024, 3, 5)]);
    assert_eq!(next.metrics.failure_history.len(), 4);
}

#[tokio::test]
async fn test_reversal_is_not_charged_again() {
    let store = setup_test_store().await;
    let template = RecurrenceTemplate::new("u1", "Journal", RecurrencePattern::Daily);
    store.insert_template(&template).await.unwrap();
    let instance = instance_of(&template, date(2024, 3, 1));
    store.insert_instance_if_absent(&instance).await.unwrap();

    store
        .toggle_instance(&instance.id, true, Utc::now())
        .await
        .unwrap();
    let undone = store
        .toggle_instance(&instance.id, false, Utc::now())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(undone.instance.misses_through, Some(date(2024, 3, 1)));

    assert!(store
        .unrecorded_misses("u1", date(2024, 3, 1))
        .await
        .unwrap()
        .is_empty());
    assert!(store
        .record_misses(&instance.id, date(2024, 3, 1))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_claim_send_only_once() {
    let store = setup_test_store().await;
    let now = Utc::now();
    assert!(store
        .claim_send("u1", "morning_brief", "", "2024-03-01", now)
        .await
        .unwrap());
    assert!(!store
        .claim_send("u1", "morning_brief", "", "2024-03-01", now)
        .await
        .unwrap());
    assert!(store
        .was_sent("u1", "morning_brief", "", "2024-03-01")
        .await
        .unwrap());

    // Different cycle, subject or user is a separate record.
    assert!(store
        .claim_send("u1", "morning_brief", "", "2024-03-02", now)
        .await
        .unwrap());
    assert!(store
        .claim_send("u1", "task_reminder", "t1", "2024-03-01", now)
        .await
        .unwrap());
    assert!(store
        .claim_send("u2", "morning_brief", "", "2024-03-01", now)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_settings_upsert_and_owner_listing() {
    let store = setup_test_store().await;
    assert!(store.settings("u1").await.unwrap().is_none());

    let mut settings = UserNotificationSettings::new("u1");
    settings.timezone = Some("Europe/Lisbon".to_string());
    settings.weekly_brief_day = Some(Weekday::Sun);
    settings.weekly_brief_time = NaiveTime::from_hms_opt(18, 0, 0);
    store.upsert_settings(&settings).await.unwrap();

    settings.chat_bot_enabled = true;
    settings.bot_token = Some("123:abc".to_string());
    settings.chat_id = Some("42".to_string());
    store.upsert_settings(&settings).await.unwrap();

    let loaded = store.settings("u1").await.unwrap().unwrap();
    assert_eq!(loaded.timezone.as_deref(), Some("Europe/Lisbon"));
    assert_eq!(loaded.weekly_brief_day, Some(Weekday::Sun));
    assert_eq!(loaded.weekly_brief_time, NaiveTime::from_hms_opt(18, 0, 0));
    assert_eq!(loaded.chat_bot_credentials(), Some(("123:abc", "42")));

    let template = RecurrenceTemplate::new("u2", "Run", RecurrencePattern::Daily);
    store.insert_template(&template).await.unwrap();
    assert_eq!(store.list_owners().await.unwrap(), vec!["u1", "u2"]);
}

#[tokio::test]
async fn test_push_subscriptions_dedupe_endpoint_and_delete() {
    let store = setup_test_store().await;
    let first = subscription("u1", "https://push.example/a");
    store.add_push_subscription(&first).await.unwrap();
    // Same endpoint again refreshes rather than duplicates.
    store
        .add_push_subscription(&subscription("u1", "https://push.example/a"))
        .await
        .unwrap();
    store
        .add_push_subscription(&subscription("u1", "https://push.example/b"))
        .await
        .unwrap();

    let subs = store.push_subscriptions("u1").await.unwrap();
    assert_eq!(subs.len(), 2);

    store.delete_push_subscription(&first.id).await.unwrap();
    let subs = store.push_subscriptions("u1").await.unwrap();
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].endpoint, "https://push.example/b");
}

#[tokio::test]
async fn test_reminder_queries() {
    let store = setup_test_store().await;
    let day = date(2024, 3, 1);

    let mut with_time = TaskInstance::one_off("u1", "Dentist", day);
    with_time.reminder_time = NaiveTime::from_hms_opt(9, 30, 0);
    let without_time = TaskInstance::one_off("u1", "Groceries", day);
    let mut done = TaskInstance::one_off("u1", "Done already", day);
    done.reminder_time = NaiveTime::from_hms_opt(8, 0, 0);
    done.completed = true;
    for task in [&with_time, &without_time, &done] {
        store.insert_instance_if_absent(task).await.unwrap();
    }

    let reminders = store.task_reminders_on("u1", day).await.unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].id, with_time.id);

    let note = Note {
        id: "n1".to_string(),
        owner_id: "u1".to_string(),
        title: "Renew passport".to_string(),
        body: String::new(),
        remind_on: Some(day),
        remind_at: NaiveTime::from_hms_opt(12, 0, 0),
        created_at: Utc::now(),
    };
    store.insert_note(&note).await.unwrap();
    let notes = store.note_reminders_on("u1", day).await.unwrap();
    assert_eq!(notes.len(), 1);
    assert!(store
        .note_reminders_on("u1", date(2024, 3, 2))
        .await
        .unwrap()
        .is_empty());
}
