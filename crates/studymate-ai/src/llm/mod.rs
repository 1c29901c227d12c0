//! Text generation providers.

mod gemini;
mod mock_client;
mod retry;

pub use gemini::GeminiClient;
pub use mock_client::{MockStep, MockStepKind, MockTextGenerator};
pub use retry::{RetryConfig, parse_retry_after, response_to_error};
