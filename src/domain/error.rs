use thiserror::Error;

/// Error kinds surfaced by the scan-and-detect engine.
///
/// Propagation policy: `TransientIo` and `DataShape` abandon only the unit of
/// work that hit them (one (symbol, timeframe) scan, one bot send); `Config`
/// is fatal at startup; `Invariant` is fatal under `cfg!(test)` and logged
/// with context otherwise; `Order` aborts opening a position but never the
/// orchestrator loop.
#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    #[error("malformed data: {0}")]
    DataShape(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("order rejected: {0}")]
    Order(String),
}

pub type ScannerResult<T> = Result<T, ScannerError>;
