use std::sync::Arc;

use piol_comm::{Communicator, CommunicatorExt, LocalCommunicator};
use piol_error::{PiolResult, piol_bail};
use piol_metrics::PiolMetrics;

use crate::segy::NumberFormat;

/// Default number of traces handled per codec batch.
pub const DEFAULT_MAX_TRACES_PER_IO: usize = 65536;

/// Tuning options shared by every component of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiolConfig {
    coalescing_window: Option<u64>,
    max_traces_per_io: usize,
    sort_region: Option<usize>,
    number_format: Option<NumberFormat>,
}

impl Default for PiolConfig {
    fn default() -> Self {
        Self {
            coalescing_window: None,
            max_traces_per_io: DEFAULT_MAX_TRACES_PER_IO,
            sort_region: None,
            number_format: None,
        }
    }
}

impl PiolConfig {
    /// Merge byte ranges separated by at most `window` bytes into one read.
    ///
    /// Without this the reader's own [performance hint][piol_io::PerformanceHint] applies.
    pub fn with_coalescing_window(mut self, window: u64) -> Self {
        self.coalescing_window = Some(window);
        self
    }

    /// Cap the traces decoded or encoded per batch.
    pub fn with_max_traces_per_io(mut self, max_traces: usize) -> PiolResult<Self> {
        if max_traces == 0 {
            piol_bail!("max_traces_per_io must be at least 1");
        }
        self.max_traces_per_io = max_traces;
        Ok(self)
    }

    /// Cap the elements exchanged between two neighbours in one sort phase.
    pub fn with_sort_region(mut self, region: usize) -> PiolResult<Self> {
        if region == 0 {
            piol_bail!("sort_region must be at least 1");
        }
        self.sort_region = Some(region);
        Ok(self)
    }

    /// Read samples in `format` regardless of the binary header's format code.
    pub fn with_number_format(mut self, format: NumberFormat) -> Self {
        self.number_format = Some(format);
        self
    }

    pub fn coalescing_window(&self) -> Option<u64> {
        self.coalescing_window
    }

    pub fn max_traces_per_io(&self) -> usize {
        self.max_traces_per_io
    }

    pub fn sort_region(&self) -> Option<usize> {
        self.sort_region
    }

    pub fn number_format(&self) -> Option<NumberFormat> {
        self.number_format
    }
}

/// Everything a worker needs to take part in a job: its communicator, the job's
/// configuration and the worker's metrics.
///
/// Cloning is cheap and clones share the communicator and metrics.
#[derive(Clone)]
pub struct Context {
    comm: Arc<dyn Communicator>,
    config: PiolConfig,
    metrics: Arc<PiolMetrics>,
}

impl Context {
    pub fn new<C: Communicator + 'static>(comm: C, config: PiolConfig) -> Self {
        let metrics = Arc::new(PiolMetrics::for_rank(comm.rank()));
        Self {
            comm: Arc::new(comm),
            config,
            metrics,
        }
    }

    /// A context for a job with a single worker and the default configuration.
    pub fn single() -> Self {
        Self::new(LocalCommunicator::single(), PiolConfig::default())
    }

    pub fn with_config(mut self, config: PiolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn comm(&self) -> &dyn Communicator {
        self.comm.as_ref()
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn num_ranks(&self) -> usize {
        self.comm.num_ranks()
    }

    pub fn config(&self) -> &PiolConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PiolMetrics {
        &self.metrics
    }

    /// Block until every worker reaches the barrier.
    pub fn barrier(&self) -> PiolResult<()> {
        self.comm.barrier()
    }

    /// Whether `ok` holds on every worker. Collective, and a barrier as well.
    pub fn all_agree(&self, ok: bool) -> PiolResult<bool> {
        self.comm.all_reduce_and(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        assert!(PiolConfig::default().with_max_traces_per_io(0).is_err());
        assert!(PiolConfig::default().with_sort_region(0).is_err());

        let config = PiolConfig::default()
            .with_coalescing_window(0)
            .with_max_traces_per_io(16)
            .unwrap()
            .with_number_format(NumberFormat::IeeeFloat32);
        assert_eq!(config.coalescing_window(), Some(0));
        assert_eq!(config.max_traces_per_io(), 16);
        assert_eq!(config.sort_region(), None);
        assert_eq!(config.number_format(), Some(NumberFormat::IeeeFloat32));
    }

    #[test]
    fn single_worker_context() {
        let ctx = Context::single();
        assert_eq!(ctx.rank(), 0);
        assert_eq!(ctx.num_ranks(), 1);
        assert_eq!(
            ctx.config().max_traces_per_io(),
            DEFAULT_MAX_TRACES_PER_IO
        );
        ctx.barrier().unwrap();
    }
}
