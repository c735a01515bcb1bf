//! Bounded retry applied pass by pass over an ordered set of work items

use std::future::Future;

/// How many times a unit of work is tried before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

/// Which try of an item is being run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub max: u32,
}

impl Attempt {
    pub fn is_first(&self) -> bool {
        self.number == 1
    }

    /// A failure on this attempt is terminal
    pub fn is_last(&self) -> bool {
        self.number >= self.max
    }
}

/// Run `op` over `items` in passes.
///
/// Pass one tries every item in order; each later pass retries, still in
/// original order, only the items whose previous attempt failed. An item is
/// settled by its first success or by a failure on the last attempt. Returns
/// one outcome per item, in input order.
pub async fn retry_in_passes<T, O, E, F, Fut>(
    items: Vec<T>,
    policy: RetryPolicy,
    mut op: F,
) -> Vec<(T, Result<O, E>)>
where
    T: Clone,
    F: FnMut(T, Attempt) -> Fut,
    Fut: Future<Output = Result<O, E>>,
{
    let max = policy.max_attempts.max(1);
    let mut outcomes: Vec<Option<Result<O, E>>> = items.iter().map(|_| None).collect();
    let mut pending: Vec<usize> = (0..items.len()).collect();

    for number in 1..=max {
        if pending.is_empty() {
            break;
        }

        let attempt = Attempt { number, max };
        let mut failed = Vec::new();

        for position in pending {
            match op(items[position].clone(), attempt).await {
                Ok(value) => outcomes[position] = Some(Ok(value)),
                Err(e) if attempt.is_last() => outcomes[position] = Some(Err(e)),
                Err(_) => failed.push(position),
            }
        }

        pending = failed;
    }

    // the last pass settles every remaining item
    items
        .into_iter()
        .zip(outcomes)
        .filter_map(|(item, outcome)| outcome.map(|outcome| (item, outcome)))
        .collect()
}
