use std::cell::Cell;
use std::sync::Arc;

use manga_core::interactions::{
    InteractionClient, KvLogSink, PageExit, SeriesInteractions, process_logs, series_stats,
};
use manga_core::kv::{DiskKv, KvStore};
use manga_core::store::MemoryStorage;

fn reader(avatars: &[&str]) -> InteractionClient {
    InteractionClient::new(Arc::new(MemoryStorage::new()), avatars.iter().map(|a| a.to_string()).collect())
}

#[test]
fn queued_actions_reach_the_aggregate() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let logs = DiskKv::new(temp.path().join("logs"))?;
    let aggregates = DiskKv::new(temp.path().join("interactions"))?;
    let sink = KvLogSink::new(&logs);

    let alice = reader(&["Rin_Tohsaka.png"]);
    assert!(alice.toggle_like("solo", "12")?);
    let comment = alice.submit_comment("solo", "12", "  great chapter  ", 1_700_000_000_000)?;
    alice.set_rating("solo", 8.0)?;
    alice.set_rating("solo", 9.0)?;

    let report = alice.flush(PageExit::Internal, &sink)?;
    assert!(report.skipped);
    assert!(logs.list("log:")?.is_empty());

    let report = alice.flush(PageExit::Leaving, &sink)?;
    assert_eq!(report.sent, vec!["solo".to_string()]);
    assert!(alice.queue().pending().is_empty());

    let bob = reader(&[]);
    bob.toggle_like("solo", "12")?;
    bob.toggle_like("solo", "ep-S1-3")?;
    bob.set_rating("solo", 6.0)?;
    bob.flush(PageExit::Leaving, &sink)?;
    assert_eq!(logs.list("log:solo:")?.len(), 2);

    let processed = process_logs(&logs, &aggregates)?;
    assert_eq!(processed.series, 1);
    assert_eq!(processed.logs, 2);
    assert!(logs.list("log:")?.is_empty());

    let stats = series_stats(&aggregates, "solo")?;
    let chapter = stats.get("12").expect("chapter aggregate");
    assert_eq!(chapter.likes, 2);
    assert_eq!(chapter.comments(), std::slice::from_ref(&comment));
    assert_eq!(stats.get("ep-S1-3").map(|ep| ep.likes), Some(1));
    let ratings = stats.ratings().expect("ratings");
    assert_eq!((ratings.count, ratings.average), (2, 7.5));

    let view = alice.chapter_view("solo", "12", &stats);
    assert_eq!(view.comment_count, 1);
    assert_eq!(view.comments[0].comment.username, "Rin Tohsaka");
    assert!(!view.can_comment);

    let rating = alice.rating_view("solo", &stats);
    assert_eq!(rating.votes, 2);
    assert_eq!(rating.user_rating, Some(9.0));
    Ok(())
}

#[test]
fn stats_cache_serves_repeat_reads() -> anyhow::Result<()> {
    let temp = tempfile::tempdir()?;
    let aggregates = DiskKv::new(temp.path())?;
    let client = reader(&[]);

    let fetches = Cell::new(0);
    let load = |slug: &str| -> manga_core::Result<SeriesInteractions> {
        fetches.set(fetches.get() + 1);
        Ok(series_stats(&aggregates, slug)?)
    };
    assert!(client.series_stats("solo", &load).is_empty());
    assert!(client.series_stats("solo", &load).is_empty());
    assert_eq!(fetches.get(), 1);

    client.forget_stats("solo");
    client.series_stats("solo", &load);
    assert_eq!(fetches.get(), 2);
    Ok(())
}
