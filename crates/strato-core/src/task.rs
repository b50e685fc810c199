use std::thread;

use anyhow::{Result, anyhow};

/// Run a batch of independent tasks on scoped threads and join them all.
///
/// This is a barrier: every task runs to completion (or failure) before
/// the call returns. The first error encountered, in task order, is
/// surfaced after the join; sibling tasks are never cancelled.
pub fn join_all<T, F>(tasks: Vec<F>) -> Result<Vec<T>>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    let results: Vec<Result<T>> = thread::scope(|s| {
        let handles: Vec<_> = tasks.into_iter().map(|f| s.spawn(f)).collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(res) => res,
                Err(_) => Err(anyhow!("provisioning task panicked")),
            })
            .collect()
    });

    let mut out = Vec::with_capacity(results.len());
    for res in results {
        out.push(res?);
    }
    Ok(out)
}

/// Three-way heterogeneous join barrier. Used where a stage fans out
/// tasks with different result types (e.g. network facts, IAM facts,
/// firewall facts) and needs all three before proceeding.
pub fn join3<A, B, C>(
    fa: impl FnOnce() -> Result<A> + Send,
    fb: impl FnOnce() -> Result<B> + Send,
    fc: impl FnOnce() -> Result<C> + Send,
) -> Result<(A, B, C)>
where
    A: Send,
    B: Send,
    C: Send,
{
    let (ra, rb, rc) = thread::scope(|s| {
        let ha = s.spawn(fa);
        let hb = s.spawn(fb);
        let hc = s.spawn(fc);
        (
            ha.join().unwrap_or_else(|_| Err(anyhow!("task panicked"))),
            hb.join().unwrap_or_else(|_| Err(anyhow!("task panicked"))),
            hc.join().unwrap_or_else(|_| Err(anyhow!("task panicked"))),
        )
    });
    Ok((ra?, rb?, rc?))
}
