//! Provider implementations, factory, and the process-wide registry.
//!
//! Each provider module implements the [`Provider`] trait for a specific
//! upstream class. The [`ProviderFactory`] constructs instances from
//! catalog rows; the [`Registry`] owns every live instance.
//!
//! [`Provider`]: qwengate_types::Provider

pub mod factory;
pub mod http_util;
pub mod openai_compat;
pub mod qwen_direct;
pub mod qwen_http;
pub mod registry;

pub use factory::ProviderFactory;
pub use http_util::ProviderHttp;
pub use openai_compat::OpenAiCompatProvider;
pub use qwen_direct::QwenDirectProvider;
pub use qwen_http::{DEFAULT_BASE_URL, QwenClient, RetryPolicy};
pub use registry::Registry;
