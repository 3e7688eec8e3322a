use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("position sample timeout")]
    Timeout,
    #[error("adc error: {0}")]
    Adc(String),
    #[error("no such channel: {0}")]
    BadChannel(usize),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
