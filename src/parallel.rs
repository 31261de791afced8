use rayon::prelude::*;

/// Execution backend for the data-parallel kernels of this crate
///
/// Every kernel (DOF map construction, scatter/gather, quadrature updates, force actions) is
/// written once against the primitives below. The backend only decides whether the work items
/// run in order on the calling thread or on the Rayon Global Threadpool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    /// Run every work item in order on the calling thread
    Serial,
    /// Distribute work items over the Rayon Global Threadpool
    #[default]
    Threaded,
}

impl Backend {
    /// Run `f` once for every index in `0..n`
    pub fn for_each_index<F>(self, n: usize, f: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        match self {
            Self::Serial => (0..n).for_each(f),
            Self::Threaded => (0..n).into_par_iter().for_each(f),
        }
    }

    /// Split `data` into consecutive chunks of `chunk_size` entries and run `f(chunk_index, chunk)` on each.
    ///
    /// The final chunk may be shorter if `data.len()` is not a multiple of `chunk_size`.
    pub fn for_each_chunk<T, F>(self, data: &mut [T], chunk_size: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        assert!(
            chunk_size > 0,
            "Chunk size must be positive; cannot partition parallel work!"
        );

        match self {
            Self::Serial => data
                .chunks_mut(chunk_size)
                .enumerate()
                .for_each(|(i, chunk)| f(i, chunk)),
            Self::Threaded => data
                .par_chunks_mut(chunk_size)
                .enumerate()
                .for_each(|(i, chunk)| f(i, chunk)),
        }
    }

    /// Evaluate `f` for every index in `0..n` and collect the results in index order
    pub fn map_collect<T, F>(self, n: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Send + Sync,
    {
        match self {
            Self::Serial => (0..n).map(f).collect(),
            Self::Threaded => (0..n).into_par_iter().map(f).collect(),
        }
    }

    pub fn is_threaded(&self) -> bool {
        *self == Self::Threaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn every_index_visited_once() {
        for backend in [Backend::Serial, Backend::Threaded] {
            let hits: Vec<AtomicUsize> = (0..100).map(|_| AtomicUsize::new(0)).collect();
            backend.for_each_index(100, |i| {
                hits[i].fetch_add(1, Ordering::Relaxed);
            });
            assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));
        }
    }

    #[test]
    fn chunks_are_indexed_in_order() {
        for backend in [Backend::Serial, Backend::Threaded] {
            let mut data = vec![0; 10];
            backend.for_each_chunk(&mut data, 3, |c, chunk| {
                for v in chunk.iter_mut() {
                    *v = c;
                }
            });
            assert_eq!(data, vec![0, 0, 0, 1, 1, 1, 2, 2, 2, 3]);
        }
    }

    #[test]
    fn map_collect_preserves_order() {
        let squares = Backend::Threaded.map_collect(50, |i| i * i);
        assert_eq!(squares, (0..50).map(|i| i * i).collect::<Vec<_>>());
    }

    #[test]
    #[should_panic]
    fn zero_sized_chunks() {
        let mut data = vec![0.0; 4];
        Backend::Serial.for_each_chunk(&mut data, 0, |_, _| {});
    }
}
