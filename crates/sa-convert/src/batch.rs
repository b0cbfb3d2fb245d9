// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Concurrent per-item conversion.
//!
//! Items are independent: each reads its own inputs and writes its own
//! outputs. [`run_batch`] runs them on the blocking pool with at most
//! `max_workers` in flight and reports progress over a channel.

use crate::Error;
use futures::future::join_all;
use log::{info, warn};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::sync::{Semaphore, mpsc::Sender};

/// Progress information for long-running conversions.
///
/// # Examples
///
/// ```rust
/// use sa_convert::Progress;
///
/// let progress = Progress {
///     current: 25,
///     total: 100,
/// };
/// let percentage = (progress.current as f64 / progress.total as f64) * 100.0;
/// println!(
///     "Progress: {:.1}% ({}/{})",
///     percentage, progress.current, progress.total
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current number of completed items.
    pub current: usize,
    /// Total number of items to process.
    pub total: usize,
}

/// Outcome of a batch: item names split by success, plus the successful
/// results in input order.
#[derive(Debug, Clone)]
pub struct BatchReport<R> {
    pub converted: Vec<String>,
    pub not_converted: Vec<String>,
    pub results: Vec<R>,
}

impl<R> Default for BatchReport<R> {
    fn default() -> Self {
        Self {
            converted: Vec::new(),
            not_converted: Vec::new(),
            results: Vec::new(),
        }
    }
}

impl<R> BatchReport<R> {
    /// Split off the results, leaving a report of unit results.
    pub fn take_results(self) -> (BatchReport<()>, Vec<R>) {
        let report = BatchReport {
            converted: self.converted,
            not_converted: self.not_converted,
            results: vec![(); self.results.len()],
        };
        (report, self.results)
    }
}

/// Run `work` on every named item.
///
/// A failing or panicking item is logged and listed in
/// [`BatchReport::not_converted`]; the remaining items still run. Only a
/// closed semaphore aborts the batch. `max_workers` must be at least 1.
///
/// When `progress` is given, one message is sent after every item. The
/// receiver must be drained or dropped.
pub async fn run_batch<T, R, F>(
    items: Vec<(String, T)>,
    max_workers: usize,
    progress: Option<Sender<Progress>>,
    work: F,
) -> Result<BatchReport<R>, Error>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Result<R, Error> + Send + Sync + 'static,
{
    if max_workers == 0 {
        return Err(Error::InvalidParameters(
            "max_workers must be at least 1".to_string(),
        ));
    }

    let total = items.len();
    let current = Arc::new(AtomicUsize::new(0));
    let sem = Arc::new(Semaphore::new(max_workers));
    let work = Arc::new(work);

    let tasks = items
        .into_iter()
        .map(|(name, item)| {
            let sem = sem.clone();
            let current = current.clone();
            let progress = progress.clone();
            let work = work.clone();

            tokio::spawn(async move {
                let _permit = sem.acquire().await?;

                let result = tokio::task::spawn_blocking(move || work(item))
                    .await
                    .unwrap_or_else(|err| Err(Error::from(err)));

                if let Some(progress) = &progress {
                    let current = current.fetch_add(1, Ordering::SeqCst);
                    let _ = progress
                        .send(Progress {
                            current: current + 1,
                            total,
                        })
                        .await;
                }

                Ok::<_, Error>((name, result))
            })
        })
        .collect::<Vec<_>>();

    drop(progress);

    let mut report = BatchReport::default();
    for joined in join_all(tasks).await {
        let (name, result) = joined??;
        match result {
            Ok(value) => {
                report.converted.push(name);
                report.results.push(value);
            }
            Err(err) => {
                warn!("{} was not converted: {}", name, err);
                report.not_converted.push(name);
            }
        }
    }

    info!(
        "Converted {} of {} items ({} not converted)",
        report.converted.len(),
        total,
        report.not_converted.len()
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn named(values: &[u32]) -> Vec<(String, u32)> {
        values.iter().map(|v| (format!("item-{}", v), *v)).collect()
    }

    #[tokio::test]
    async fn test_partial_failure_continues() {
        let report = run_batch(named(&[1, 2, 3, 4, 5]), 2, None, |v| {
            if v % 2 == 0 {
                Err(Error::UnreadableImage {
                    path: format!("{}.png", v).into(),
                    reason: "corrupt".to_string(),
                })
            } else {
                Ok(v * 10)
            }
        })
        .await
        .unwrap();

        assert_eq!(report.converted, vec!["item-1", "item-3", "item-5"]);
        assert_eq!(report.not_converted, vec!["item-2", "item-4"]);
        assert_eq!(report.results, vec![10, 30, 50]);
    }

    #[tokio::test]
    async fn test_panicking_item_is_not_converted() {
        let report = run_batch(named(&[1, 2, 3]), 2, None, |v| {
            if v == 2 {
                panic!("attempt to subtract with overflow");
            }
            Ok(v)
        })
        .await
        .unwrap();

        assert_eq!(report.converted, vec!["item-1", "item-3"]);
        assert_eq!(report.not_converted, vec!["item-2"]);
        assert_eq!(report.results, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_zero_workers_is_rejected() {
        let result = run_batch(named(&[1]), 0, None, Ok).await;
        assert!(matches!(result, Err(Error::InvalidParameters(_))));
    }

    #[tokio::test]
    async fn test_progress_messages() {
        let (tx, mut rx) = mpsc::channel(16);
        let report = run_batch(named(&[1, 2, 3]), 4, Some(tx), Ok).await.unwrap();
        assert_eq!(report.results.len(), 3);

        let mut seen = Vec::new();
        while let Some(progress) = rx.recv().await {
            assert_eq!(progress.total, 3);
            seen.push(progress.current);
        }
        seen.sort();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_harmless() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let report = run_batch(named(&[1, 2, 3]), 1, Some(tx), Ok).await.unwrap();
        assert_eq!(report.converted.len(), 3);
    }

    #[tokio::test]
    async fn test_worker_limit() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());

        run_batch(named(&[1, 2, 3, 4, 5, 6, 7, 8]), 2, None, move |v| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(v)
        })
        .await
        .unwrap();

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let report: BatchReport<u32> = run_batch(Vec::<(String, u32)>::new(), 2, None, Ok)
            .await
            .unwrap();
        assert!(report.converted.is_empty());
        assert!(report.not_converted.is_empty());
    }
}
