use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::db::Database;
use crate::fetcher::Fetcher;
use crate::scraper::{scrape_next_feed, CycleError};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("duration {0:?} must be positive")]
    NotPositive(String),
}

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 60 * 60 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}

/// Parses a duration literal such as `30s`, `1h30m` or `1.5h`: an optional
/// sign followed by one or more `<decimal><unit>` pairs. Only positive
/// durations are accepted.
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let invalid = || IntervalError::Invalid(input.to_string());

    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };
    if rest == "0" {
        return Err(IntervalError::NotPositive(input.to_string()));
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);
        let (frac_part, after) = match after.strip_prefix('.') {
            Some(stripped) => {
                let frac_len = stripped.bytes().take_while(u8::is_ascii_digit).count();
                stripped.split_at(frac_len)
            }
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = after
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(after.len());
        let (unit, after) = after.split_at(unit_len);
        if unit.is_empty() {
            return Err(IntervalError::MissingUnit(input.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| IntervalError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        if !int_part.is_empty() {
            let whole: u128 = int_part.parse().map_err(|_| invalid())?;
            total = whole
                .checked_mul(scale)
                .and_then(|n| total.checked_add(n))
                .ok_or_else(invalid)?;
        }
        if !frac_part.is_empty() {
            // Anything past nanosecond precision of the largest unit is noise.
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| invalid())?;
            total += frac * scale / 10u128.pow(digits.len() as u32);
        }
        if total > u64::MAX as u128 {
            return Err(invalid());
        }

        rest = after;
    }

    if negative || total == 0 {
        return Err(IntervalError::NotPositive(input.to_string()));
    }
    Ok(Duration::from_nanos(total as u64))
}

/// Fixed-interval driver. Cycles run one at a time: the next tick is not
/// awaited until the current cycle has returned, and ticks missed while a
/// cycle overran are dropped rather than replayed.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_arg(arg: &str) -> Result<Self, IntervalError> {
        parse_interval(arg).map(Self::new)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `cycle` immediately and then once per interval, forever.
    pub async fn run<F, Fut>(&self, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            cycle().await;
        }
    }
}

/// Polls feeds until the process is killed. Cycle failures are logged here
/// and never stop the loop.
pub async fn start_aggregation(scheduler: &Scheduler, db: &Database, fetcher: &Fetcher) {
    info!(interval = ?scheduler.interval(), "Starting feed aggregation");

    scheduler
        .run(move || async move {
            match scrape_next_feed(db, fetcher).await {
                Ok(_) => {}
                Err(CycleError::NoFeeds) => info!("No feeds to fetch yet"),
                Err(e) => error!("Feed collection failed: {}", e),
            }
        })
        .await
}
