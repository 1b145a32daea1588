//! Worker pool used inside layers.
//!
//! Layers never spawn threads themselves: they ask for the current executor
//! and fan their independent output planes out through it. The process-wide
//! default can be replaced, and an extractor installs its own executor for
//! the duration of one extraction with `multithread_scope`.
use std::cell::RefCell;
#[allow(unused_imports)]
use std::sync::{Arc, Mutex};

#[cfg(feature = "multithread")]
use rayon::{prelude::*, ThreadPool, ThreadPoolBuilder};

use crate::CnResult;

#[derive(Debug, Clone, Default)]
pub enum Executor {
    #[default]
    SingleThread,
    #[cfg(feature = "multithread")]
    MultiThread(Arc<ThreadPool>),
}

impl Executor {
    pub fn multithread(n: usize) -> CnResult<Executor> {
        Executor::multithread_with_name(n, "cachenet")
    }

    #[cfg(feature = "multithread")]
    pub fn multithread_with_name(n: usize, name: &str) -> CnResult<Executor> {
        let name = name.to_string();
        let pool = ThreadPoolBuilder::new()
            .thread_name(move |n| format!("{name}-{n}"))
            .num_threads(n)
            .build()?;
        Ok(Executor::MultiThread(Arc::new(pool)))
    }

    #[cfg(not(feature = "multithread"))]
    pub fn multithread_with_name(n: usize, _name: &str) -> CnResult<Executor> {
        debug!("Built without multithread support, ignoring request for {} threads", n);
        Ok(Executor::SingleThread)
    }

    /// Number of workers.
    pub fn threads(&self) -> usize {
        match self {
            Executor::SingleThread => 1,
            #[cfg(feature = "multithread")]
            Executor::MultiThread(pool) => pool.current_num_threads(),
        }
    }

    /// Run `f` on every `chunk`-sized piece of `data`, passing the chunk
    /// index along.
    pub fn for_each_chunk_mut<T, F>(&self, data: &mut [T], chunk: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        if chunk == 0 {
            return;
        }
        match self {
            Executor::SingleThread => {
                data.chunks_mut(chunk).enumerate().for_each(|(ix, c)| f(ix, c))
            }
            #[cfg(feature = "multithread")]
            Executor::MultiThread(pool) => pool.install(|| {
                data.par_chunks_mut(chunk).enumerate().for_each(|(ix, c)| f(ix, c))
            }),
        }
    }
}

static DEFAULT_EXECUTOR: Mutex<Executor> = Mutex::new(Executor::SingleThread);

thread_local! {
    static TLS_EXECUTOR_OVERRIDE: RefCell<Option<Executor>> = const { RefCell::new(None) };
}

pub fn current_executor() -> Executor {
    if let Some(over_ride) = TLS_EXECUTOR_OVERRIDE.with_borrow(|tls| tls.clone()) {
        over_ride
    } else {
        DEFAULT_EXECUTOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

pub fn set_default_executor(executor: Executor) {
    *DEFAULT_EXECUTOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = executor;
}

/// Run `f` with `executor` as the current executor of this thread, then
/// restore the previous one.
pub fn multithread_scope<R, F: FnOnce() -> R>(executor: Executor, f: F) -> R {
    let previous = TLS_EXECUTOR_OVERRIDE.replace(Some(executor));
    let result = f();
    TLS_EXECUTOR_OVERRIDE.set(previous);
    result
}
