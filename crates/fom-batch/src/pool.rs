//! Pool de workers de tamaño fijo.
//!
//! Con un solo worker las unidades corren secuencialmente en el hilo que
//! llama. Con `n > 1` se usa un `rayon::ThreadPool` propio (no el global)
//! de exactamente `n` hilos. En ambos casos el resultado conserva el orden
//! de entrada y `map` retorna sólo cuando todas las unidades terminaron.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::BatchError;

pub struct WorkerPool {
    workers: usize,
    pool: Option<ThreadPool>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, BatchError> {
        if workers == 0 {
            return Err(BatchError::InvalidWorkerCount);
        }
        let pool = if workers == 1 {
            None
        } else {
            Some(ThreadPoolBuilder::new().num_threads(workers)
                                         .thread_name(|i| format!("fom-worker-{i}"))
                                         .build()
                                         .map_err(|e| BatchError::Pool(e.to_string()))?)
        };
        Ok(Self { workers, pool })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn map<T, R, F>(&self, units: &[T], f: F) -> Vec<R>
        where T: Sync,
              R: Send,
              F: Fn(&T) -> R + Send + Sync
    {
        match &self.pool {
            None => units.iter().map(f).collect(),
            Some(pool) => pool.install(|| units.par_iter().map(f).collect()),
        }
    }
}
