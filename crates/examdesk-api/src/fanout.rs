//! Bounded concurrent fan-out over a list of inputs.

use std::{future::Future, sync::Arc};

use tokio::{
  sync::Semaphore,
  task::{JoinError, JoinSet},
};

/// Run `f` over every item with at most `limit` futures in flight.
///
/// Results come back in input order. The first failure aborts every task
/// still running and is returned. Dropping the returned future drops the
/// `JoinSet`, which aborts whatever is in flight.
pub async fn bounded<T, R, E, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Result<Vec<R>, E>
where
  T: Send + 'static,
  R: Send + 'static,
  E: From<JoinError> + Send + 'static,
  F: Fn(T) -> Fut,
  Fut: Future<Output = Result<R, E>> + Send + 'static,
{
  let permits = Arc::new(Semaphore::new(limit.max(1)));
  let mut set = JoinSet::new();
  let mut results: Vec<Option<R>> = Vec::with_capacity(items.len());

  for (index, item) in items.into_iter().enumerate() {
    results.push(None);
    let permits = permits.clone();
    let task = f(item);
    set.spawn(async move {
      // The semaphore is never closed, so this only fails if it is.
      let _permit = permits.acquire_owned().await.ok();
      (index, task.await)
    });
  }

  while let Some(joined) = set.join_next().await {
    match joined {
      Ok((index, Ok(value))) => results[index] = Some(value),
      Ok((_, Err(err))) => {
        set.abort_all();
        return Err(err);
      }
      Err(err) => {
        set.abort_all();
        return Err(E::from(err));
      }
    }
  }

  Ok(results.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
  use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
  };

  use super::*;
  use crate::error::ApiError;

  #[tokio::test]
  async fn keeps_input_order() {
    let out: Vec<u64> = bounded(vec![30u64, 10, 20, 0], 2, |ms| async move {
      tokio::time::sleep(Duration::from_millis(ms)).await;
      Ok::<_, ApiError>(ms)
    })
    .await
    .unwrap();
    assert_eq!(out, vec![30, 10, 20, 0]);
  }

  #[tokio::test]
  async fn never_exceeds_the_limit() {
    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let result = bounded((0..12).collect::<Vec<u32>>(), 3, |_| {
      let live = live.clone();
      let peak = peak.clone();
      async move {
        let now = live.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        live.fetch_sub(1, Ordering::SeqCst);
        Ok::<_, ApiError>(())
      }
    })
    .await;

    assert!(result.is_ok());
    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(peak.load(Ordering::SeqCst) >= 1);
  }

  #[tokio::test]
  async fn first_failure_is_surfaced() {
    let finished = Arc::new(AtomicUsize::new(0));
    let result = bounded((0..8).collect::<Vec<u32>>(), 2, |i| {
      let finished = finished.clone();
      async move {
        if i == 0 {
          return Err(ApiError::NotFound("boom".into()));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        finished.fetch_add(1, Ordering::SeqCst);
        Ok(i)
      }
    })
    .await;

    assert!(matches!(result, Err(ApiError::NotFound(m)) if m == "boom"));
    assert!(finished.load(Ordering::SeqCst) < 7);
  }

  #[tokio::test]
  async fn empty_input() {
    let out: Vec<u8> = bounded(Vec::<u8>::new(), 4, |x| async move { Ok::<_, ApiError>(x) })
      .await
      .unwrap();
    assert!(out.is_empty());
  }
}
