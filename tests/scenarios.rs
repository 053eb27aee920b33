// Exercises the numbered scenarios and testable properties from spec.md §8,
// grounded on the original's `tests.py` (`TestSubscribe`/`TestPublish`/
// `TestActivity`), translated to `#[tokio::test]`s against an in-memory
// store and the in-process cache. The original's `sleep(1)` waits for the
// background queue to drain are replaced with `queue.flush().await`, since
// we control the runtime and don't need to guess at timing.
mod support;

use feed_aggregator::error::CoreError;
use feed_aggregator::models::{PublishPayload, RetractPayload};
use support::Harness;

fn publish(verb: &str, producer_id: &str, item_id: &str, timestamp: i64) -> PublishPayload {
    PublishPayload {
        verb: verb.to_string(),
        producer_id: producer_id.to_string(),
        item_id: item_id.to_string(),
        timestamp,
        consumer_id: None,
    }
}

fn directed_publish(verb: &str, producer_id: &str, consumer_id: &str, item_id: &str, timestamp: i64) -> PublishPayload {
    PublishPayload {
        verb: verb.to_string(),
        producer_id: producer_id.to_string(),
        item_id: item_id.to_string(),
        timestamp,
        consumer_id: Some(consumer_id.to_string()),
    }
}

/// Scenario 1: broadcast fan-out. 5 subscribers each see all 10 items in
/// timestamp-descending order.
#[tokio::test]
async fn broadcast_fan_out_reaches_every_subscriber() {
    let harness = Harness::boot().await;

    for consumer in ["u1", "u2", "u3", "u4", "u5"] {
        harness
            .processor
            .subscribe("feed", consumer.to_string(), "P".to_string())
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    for i in 0..10 {
        harness
            .processor
            .publish(publish("podcast", "P", &format!("item-{i}"), 1000 + i))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    for consumer in ["u1", "u2", "u3", "u4", "u5"] {
        let data = harness
            .processor
            .consume("feed", consumer, 10, None, None)
            .await
            .unwrap();
        assert_eq!(data.len(), 10);
        let ids: Vec<_> = data.iter().map(|c| c.item_id.clone()).collect();
        let expected: Vec<_> = (0..10).rev().map(|i| format!("item-{i}")).collect();
        assert_eq!(ids, expected, "consumer {consumer} out of order");
    }
}

/// Scenario 2: unsubscribe removes the backlog for that consumer only.
#[tokio::test]
async fn unsubscribe_removes_backlog_but_not_other_subscribers() {
    let harness = Harness::boot().await;

    for consumer in ["u1", "u2"] {
        harness
            .processor
            .subscribe("feed", consumer.to_string(), "P".to_string())
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    for i in 0..10 {
        harness
            .processor
            .publish(publish("podcast", "P", &format!("item-{i}"), 1000 + i))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    harness
        .processor
        .unsubscribe("feed", "u1".to_string(), "P".to_string())
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    let u1 = harness.processor.consume("feed", "u1", 10, None, None).await.unwrap();
    assert_eq!(u1.len(), 0);

    let u2 = harness.processor.consume("feed", "u2", 10, None, None).await.unwrap();
    assert_eq!(u2.len(), 10);
}

/// Scenario 3: retract propagates to every remaining subscriber.
#[tokio::test]
async fn retract_removes_item_from_every_subscriber() {
    let harness = Harness::boot().await;

    for consumer in ["u1", "u2", "u3"] {
        harness
            .processor
            .subscribe("feed", consumer.to_string(), "P".to_string())
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    for i in 0..10 {
        harness
            .processor
            .publish(publish("podcast", "P", &format!("item-{i}"), 1000 + i))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    harness
        .processor
        .retract(RetractPayload {
            verb: "podcast".to_string(),
            producer_id: "P".to_string(),
            item_id: "item-5".to_string(),
            consumer_id: None,
        })
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    for consumer in ["u1", "u2", "u3"] {
        let data = harness
            .processor
            .consume("feed", consumer, 10, None, None)
            .await
            .unwrap();
        assert_eq!(data.len(), 9);
        assert!(data.iter().all(|c| c.item_id != "item-5"));
    }
}

/// Scenario 4: a late subscriber backfills the full existing history.
#[tokio::test]
async fn late_subscriber_backfills_existing_history() {
    let harness = Harness::boot().await;

    for i in 0..10 {
        harness
            .processor
            .publish(publish("podcast", "P", &format!("item-{i}"), 1000 + i))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    harness
        .processor
        .subscribe("feed", "u6".to_string(), "P".to_string())
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    let data = harness.processor.consume("feed", "u6", 10, None, None).await.unwrap();
    assert_eq!(data.len(), 10);
}

/// Scenario 5: directed activity feed, typed by verb, gated by subscription
/// only for backfill/removal (not for delivery of a directly addressed
/// item).
#[tokio::test]
async fn directed_activity_feed_is_addressed_not_broadcast() {
    let harness = Harness::boot().await;

    let verbs = ["like", "follow", "comment", "mention"];
    for (i, verb) in verbs.iter().cycle().take(8).enumerate() {
        let producer = if i % 2 == 0 { "P1" } else { "P2" };
        harness
            .processor
            .publish(directed_publish(verb, producer, "u", &format!("n-{i}"), 1000 + i as i64))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    let data = harness
        .processor
        .consume("notification", "u", 20, None, None)
        .await
        .unwrap();
    assert_eq!(data.len(), 8, "add doesn't consult relations, only the addressed consumer_id");

    // `unsubscribe` removes whatever rows are actually stored for this
    // producer/consumer pair, independent of whether a `subscribe` call
    // ever ran for them — it reads `activity_events` directly rather than
    // gating on the `relations` table. P1 addressed 4 of the 8 items.
    harness
        .processor
        .unsubscribe("notification", "u".to_string(), "P1".to_string())
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    let data = harness
        .processor
        .consume("notification", "u", 20, None, None)
        .await
        .unwrap();
    assert_eq!(data.len(), 4);
    assert!(data.iter().all(|c| ["n-1", "n-3", "n-5", "n-7"].contains(&c.item_id.as_str())));
}

/// Scenario 6: cap enforcement — publishing beyond `max_cache` keeps only
/// the most recent `max_cache` items.
#[tokio::test]
async fn cap_enforcement_keeps_only_most_recent() {
    let harness = Harness::boot_with_small_flat_cap(50).await;

    harness
        .processor
        .subscribe("feed", "u".to_string(), "P".to_string())
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    for i in 0..120 {
        harness
            .processor
            .publish(publish("podcast", "P", &format!("item-{i}"), 1000 + i))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    let data = harness
        .processor
        .consume("feed", "u", 1000, None, None)
        .await
        .unwrap();
    assert_eq!(data.len(), 50);
    assert_eq!(data[0].item_id, "item-119");
    assert_eq!(data[49].item_id, "item-70");
}

/// Scenario 7: cursor paging — `after` returns items strictly after the
/// cursor in the cache's reverse order.
#[tokio::test]
async fn cursor_paging_after_returns_the_next_page() {
    let harness = Harness::boot().await;

    harness
        .processor
        .subscribe("feed", "u".to_string(), "P".to_string())
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    for i in 0..20 {
        harness
            .processor
            .publish(publish("podcast", "P", &format!("item-{i}"), 1000 + i))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    let first_page = harness
        .processor
        .consume("feed", "u", 10, None, None)
        .await
        .unwrap();
    assert_eq!(first_page.len(), 10);

    // Page past the cursor using the last item of the first page, so the
    // second page picks up exactly where the first left off.
    let cursor = &first_page[9].item_id;
    assert_eq!(cursor, "item-10");
    let next_page = harness
        .processor
        .consume("feed", "u", 10, Some(cursor), None)
        .await
        .unwrap();

    let expected: Vec<_> = (0..10).rev().map(|i| format!("item-{i}")).collect();
    assert_eq!(
        next_page.iter().map(|c| c.item_id.clone()).collect::<Vec<_>>(),
        expected
    );
}

/// `after` and `before` together is a `CursorConflict`, never ambiguous
/// behavior (spec.md §9(b)).
#[tokio::test]
async fn after_and_before_together_is_a_cursor_conflict() {
    let harness = Harness::boot().await;
    harness
        .processor
        .subscribe("feed", "u".to_string(), "P".to_string())
        .await
        .unwrap();
    harness
        .processor
        .publish(publish("podcast", "P", "item-0", 1000))
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    let result = harness
        .processor
        .consume("feed", "u", 10, Some("item-0"), Some("item-0"))
        .await;
    assert!(matches!(result, Err(CoreError::CursorConflict)));
}

/// Publishing an unregistered verb is rejected rather than silently
/// dropped.
#[tokio::test]
async fn publish_with_unknown_verb_is_rejected() {
    let harness = Harness::boot().await;
    let result = harness
        .processor
        .publish(publish("unknown-verb", "P", "item-0", 1000))
        .await;
    assert!(matches!(result, Err(CoreError::UnknownVerb(_))));
}

/// Consuming from an unregistered feed name is rejected.
#[tokio::test]
async fn consume_from_unknown_feed_is_rejected() {
    let harness = Harness::boot().await;
    let result = harness.processor.consume("nonexistent", "u", 10, None, None).await;
    assert!(matches!(result, Err(CoreError::UnknownFeed(_))));
}

/// Idempotency: duplicate subscribe leaves state unchanged (no doubled
/// backfill of already-cached items).
#[tokio::test]
async fn duplicate_subscribe_is_idempotent() {
    let harness = Harness::boot().await;
    for i in 0..5 {
        harness
            .processor
            .publish(publish("podcast", "P", &format!("item-{i}"), 1000 + i))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    harness
        .processor
        .subscribe("feed", "u".to_string(), "P".to_string())
        .await
        .unwrap();
    harness
        .processor
        .subscribe("feed", "u".to_string(), "P".to_string())
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    let data = harness.processor.consume("feed", "u", 10, None, None).await.unwrap();
    assert_eq!(data.len(), 5);
}

/// Rebuild equivalence: rebuilding a consumer's cache from the store (here
/// forced by an unsubscribe/resubscribe cycle, which empties the cache and
/// then repopulates it from `flat_items_by_producer`) reproduces the exact
/// membership and order the cache held before the rebuild.
#[tokio::test]
async fn rebuild_reproduces_the_same_timeline() {
    let harness = Harness::boot().await;
    harness
        .processor
        .subscribe("feed", "u".to_string(), "P".to_string())
        .await
        .unwrap();
    for i in 0..5 {
        harness
            .processor
            .publish(publish("podcast", "P", &format!("item-{i}"), 1000 + i))
            .await
            .unwrap();
    }
    harness.queue.flush().await.unwrap();

    let before = harness.processor.consume("feed", "u", 10, None, None).await.unwrap();
    assert_eq!(before.len(), 5);

    harness
        .processor
        .unsubscribe("feed", "u".to_string(), "P".to_string())
        .await
        .unwrap();
    harness
        .processor
        .subscribe("feed", "u".to_string(), "P".to_string())
        .await
        .unwrap();
    harness.queue.flush().await.unwrap();

    let after = harness.processor.consume("feed", "u", 10, None, None).await.unwrap();
    assert_eq!(before, after);
}
