// =============================================================================
// Bar replay — JSONL file -> per-timeframe bar channels
// =============================================================================
//
// One `BarEvent` per line:
//   {"timeframe":"5m","bar":{"open_time":..,"close_time":..,"open":..,...},"mood":0.2}
//
// Lines for timeframes nobody listens to are counted and dropped; malformed
// lines are logged and skipped.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::market_data::{Bar, BarEvent};

/// Which clock the staleness gate is judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// Real time. Use for live feeds.
    Wall,
    /// The bar's own close time. Use for historical replay.
    Bar,
}

impl Default for ClockMode {
    fn default() -> Self {
        Self::Wall
    }
}

impl ClockMode {
    pub fn now_for(&self, bar: &Bar) -> DateTime<Utc> {
        match self {
            Self::Wall => Utc::now(),
            Self::Bar => bar.close_datetime(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub delivered: u64,
    pub unrouted: u64,
    pub malformed: u64,
}

pub fn parse_line(line: &str) -> Result<BarEvent> {
    serde_json::from_str(line).context("malformed bar event")
}

/// Stream `path` into the matching channels. Returns when the file is
/// exhausted or every receiver has gone away.
pub async fn replay_file(
    path: &Path,
    routes: HashMap<String, mpsc::Sender<BarEvent>>,
    pace: Duration,
) -> Result<ReplayStats> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("failed to open bar feed {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut routes = routes;
    let mut stats = ReplayStats::default();
    let mut line_no = 0u64;

    info!(path = %path.display(), timeframes = ?routes.keys().collect::<Vec<_>>(), "bar replay started");

    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("failed to read bar feed {}", path.display()))?
    {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let event = match parse_line(trimmed) {
            Ok(ev) => ev,
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping bar feed line");
                stats.malformed += 1;
                continue;
            }
        };
        let Some(tx) = routes.get(&event.timeframe) else {
            debug!(line = line_no, timeframe = %event.timeframe, "no pipeline for timeframe");
            stats.unrouted += 1;
            continue;
        };
        let timeframe = event.timeframe.clone();
        if tx.send(event).await.is_err() {
            warn!(timeframe = %timeframe, "pipeline gone; dropping its route");
            routes.remove(&timeframe);
            if routes.is_empty() {
                break;
            }
            continue;
        }
        stats.delivered += 1;
        if !pace.is_zero() {
            tokio::time::sleep(pace).await;
        }
    }

    info!(
        delivered = stats.delivered,
        unrouted = stats.unrouted,
        malformed = stats.malformed,
        "bar replay finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::bar_at;
    use std::io::Write;

    fn line(tf: &str, i: usize) -> String {
        serde_json::to_string(&BarEvent {
            timeframe: tf.to_string(),
            bar: bar_at(i, 100.0 + i as f64),
            mood: None,
        })
        .unwrap()
    }

    #[test]
    fn bar_clock_uses_close_time() {
        let bar = bar_at(3, 100.0);
        assert_eq!(ClockMode::Bar.now_for(&bar), bar.close_datetime());
    }

    #[test]
    fn mood_is_optional() {
        let json = r#"{"timeframe":"5m","bar":{"open_time":0,"close_time":59999,"open":1,"high":1,"low":1,"close":1}}"#;
        let ev = parse_line(json).unwrap();
        assert_eq!(ev.mood, None);
        assert_eq!(ev.bar.volume, 0.0);
    }

    #[tokio::test]
    async fn routes_by_timeframe_and_counts_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.jsonl");
        {
            let mut f = std::fs::File::create(&path).unwrap();
            writeln!(f, "{}", line("5m", 0)).unwrap();
            writeln!(f, "# comment").unwrap();
            writeln!(f, "{}", line("1h", 0)).unwrap();
            writeln!(f, "{{broken").unwrap();
            writeln!(f, "{}", line("5m", 1)).unwrap();
        }
        let (tx, mut rx) = mpsc::channel(8);
        let mut routes = HashMap::new();
        routes.insert("5m".to_string(), tx);
        let stats = replay_file(&path, routes, Duration::ZERO).await.unwrap();
        assert_eq!(
            stats,
            ReplayStats {
                delivered: 2,
                unrouted: 1,
                malformed: 1
            }
        );
        assert_eq!(rx.recv().await.unwrap().bar.open_time, bar_at(0, 1.0).open_time);
        assert_eq!(rx.recv().await.unwrap().bar.open_time, bar_at(1, 1.0).open_time);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(replay_file(&dir.path().join("nope.jsonl"), HashMap::new(), Duration::ZERO)
            .await
            .is_err());
    }
}
