/// Sampling primitives of the record store
use super::{target_count, DualPointerParams, Record, RecordStore, Sample};
use crate::query::Column;
use crate::execution::estimator::z_score;
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Running mean/variance (Welford)
#[derive(Clone, Copy, Debug, Default)]
struct RunningStats {
    count: usize,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Half-width of the interval relative to the mean, in percent
    fn relative_error_percent(&self, z: f64) -> f64 {
        if self.count == 0 || self.mean == 0.0 {
            return f64::INFINITY;
        }
        let margin = z * (self.variance() / self.count as f64).sqrt();
        margin / self.mean.abs() * 100.0
    }
}

impl RecordStore {
    /// Systematic selection during a linear walk of the leaf chain:
    /// positions `floor(start + k * step)` with a random start in `[0, step)`
    pub fn systematic_scan(&self, percent: f64) -> Sample {
        let total = self.len();
        let target = target_count(total, percent);
        if target == 0 {
            return Sample::default();
        }
        if target >= total {
            return Sample::new(self.all_records());
        }

        let step = total as f64 / target as f64;
        let start = rand::thread_rng().gen_range(0.0..step);

        let mut sampled = Vec::with_capacity(target);
        let mut next = start as usize;
        for (position, record) in self.iter().enumerate() {
            if position == next {
                sampled.push(*record);
                if sampled.len() == target {
                    break;
                }
                next = (start + sampled.len() as f64 * step) as usize;
            }
        }
        Sample::new(sampled)
    }

    /// Uniformly random distinct positions, read in storage order
    pub fn random_offsets(&self, percent: f64) -> Sample {
        let total = self.len();
        let target = target_count(total, percent);
        if target == 0 {
            return Sample::default();
        }
        if target >= total {
            return Sample::new(self.all_records());
        }

        let mut positions = rand::seq::index::sample(&mut rand::thread_rng(), total, target).into_vec();
        positions.sort_unstable();
        Sample::new(
            positions
                .into_iter()
                .filter_map(|position| self.record_at(position).copied())
                .collect(),
        )
    }

    /// Every `total / target`-th position starting at `offset % stride`
    pub fn strided(&self, percent: f64, offset: usize) -> Sample {
        let total = self.len();
        let target = target_count(total, percent);
        if target == 0 {
            return Sample::default();
        }

        let stride = (total / target).max(1);
        Sample::new(
            (offset % stride..total)
                .step_by(stride)
                .take(target)
                .filter_map(|position| self.record_at(position).copied())
                .collect(),
        )
    }

    /// Contiguous blocks spread evenly over the store, random phase
    pub fn blocks(&self, percent: f64, block_size: usize) -> Sample {
        let total = self.len();
        let target = target_count(total, percent);
        if target == 0 {
            return Sample::default();
        }
        if target >= total {
            return Sample::new(self.all_records());
        }

        let block_size = block_size.max(1);
        let total_blocks = total.div_ceil(block_size);
        let wanted_blocks = target.div_ceil(block_size).clamp(1, total_blocks);
        let interval = total_blocks as f64 / wanted_blocks as f64;
        let phase = rand::thread_rng().gen_range(0.0..interval);

        let mut sampled = Vec::with_capacity(target);
        for k in 0..wanted_blocks {
            let block = ((phase + k as f64 * interval) as usize).min(total_blocks - 1);
            let start = block * block_size;
            let end = (start + block_size).min(total);
            sampled.extend((start..end).filter_map(|position| self.record_at(position).copied()));
            if sampled.len() >= target {
                break;
            }
        }
        sampled.truncate(target);
        Sample::new(sampled)
    }

    /// Fast/slow pointer scan with CLT convergence checks.
    ///
    /// The record space is covered by interleaved pointers: fast pointers take
    /// the even slots of the systematic grid and test whether their running
    /// relative error is already within `max_error_percent`; slow pointers take
    /// the odd slots and cross-check their running mean against the fast
    /// pointers'. Either may stop the scan early. Scans that stop with less than
    /// a quarter of the target are topped up from the systematic grid.
    pub fn dual_pointer_scan(&self, params: &DualPointerParams) -> Sample {
        let total = self.len();
        let target = target_count(total, params.sample_percent);
        if target == 0 {
            return Sample::default();
        }
        if target >= total {
            return Sample::new(self.all_records());
        }

        let threads = params.thread_count.max(2);
        let fast_threads = threads / 2;
        let slow_threads = threads - fast_threads;
        let z = z_score(params.confidence_level);
        let check_interval = params.check_interval.max(2);
        let stride = total as f64 / target as f64;
        // Grid slot k sits at floor(k * stride); even slots go to fast pointers
        let slot_position = |slot: usize| ((slot as f64 * stride) as usize).min(total - 1);

        let should_stop = AtomicBool::new(false);
        let fast_mean = AtomicU64::new(f64::NAN.to_bits());
        let collected = AtomicUsize::new(0);
        let positions = Mutex::new(Vec::with_capacity(target));

        let scan = || {
            rayon::scope(|scope| {
                for worker in 0..fast_threads {
                    let (should_stop, fast_mean, collected, positions) =
                        (&should_stop, &fast_mean, &collected, &positions);
                    scope.spawn(move |_| {
                        let mut local = Vec::new();
                        let mut stats = RunningStats::default();
                        // Fast worker w owns even slots 2*(w + j*fast_threads)
                        let mut slot = 2 * worker;
                        while slot < target && !should_stop.load(Ordering::Relaxed) {
                            let position = slot_position(slot);
                            local.push(position);
                            stats.push(self.record_value(position, params.column));
                            collected.fetch_add(1, Ordering::Relaxed);

                            if stats.count % check_interval == 0 && stats.count >= 30 {
                                fast_mean.store(stats.mean.to_bits(), Ordering::Relaxed);
                                if stats.count >= 50
                                    && stats.relative_error_percent(z) <= params.max_error_percent
                                {
                                    should_stop.store(true, Ordering::Relaxed);
                                }
                            }
                            slot += 2 * fast_threads;
                        }
                        positions
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .extend(local);
                    });
                }

                for worker in 0..slow_threads {
                    let (should_stop, fast_mean, collected, positions) =
                        (&should_stop, &fast_mean, &collected, &positions);
                    scope.spawn(move |_| {
                        let mut local = Vec::new();
                        let mut stats = RunningStats::default();
                        let validate_every = (check_interval / 2).max(1);
                        let mut slot = 2 * worker + 1;
                        while slot < target && !should_stop.load(Ordering::Relaxed) {
                            let position = slot_position(slot);
                            local.push(position);
                            stats.push(self.record_value(position, params.column));
                            collected.fetch_add(1, Ordering::Relaxed);

                            if stats.count % validate_every == 0 && stats.count >= 20 {
                                let reference = f64::from_bits(fast_mean.load(Ordering::Relaxed));
                                if reference.is_finite() && reference != 0.0 {
                                    let drift = (stats.mean - reference).abs() / reference.abs();
                                    if drift <= params.max_error_percent / 100.0
                                        && collected.load(Ordering::Relaxed) >= target / 2
                                    {
                                        should_stop.store(true, Ordering::Relaxed);
                                    }
                                }
                            }
                            slot += 2 * slow_threads;
                        }
                        positions
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .extend(local);
                    });
                }
            });
        };

        match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
            Ok(pool) => pool.install(scan),
            Err(e) => {
                tracing::warn!("Dual-pointer pool unavailable ({}), using global pool", e);
                scan();
            }
        }

        let mut positions = positions.into_inner().unwrap_or_else(|e| e.into_inner());
        positions.sort_unstable();
        positions.dedup();

        if positions.len() < target / 4 {
            tracing::debug!(
                "Dual-pointer scan stopped at {} of {} samples, topping up",
                positions.len(),
                target
            );
            let mut extra: Vec<usize> = (0..target).map(slot_position).collect();
            positions.append(&mut extra);
            positions.sort_unstable();
            positions.dedup();
        }

        Sample::new(
            positions
                .into_iter()
                .filter_map(|position| self.record_at(position).copied())
                .collect::<Vec<Record>>(),
        )
    }

    fn record_value(&self, position: usize, column: Column) -> f64 {
        self.record_at(position).map(|r| r.value(column)).unwrap_or(0.0)
    }
}
