pub mod backoff;
pub mod client;
pub mod engine;
pub mod websocket;

pub use backoff::{RetryConfig, compute_delay, is_retryable_status};
pub use client::{PoolConfig, shared_client};
pub use engine::{Engine, EngineBody, EngineConfig, EngineHooks, EngineRequest, EngineResponse, EngineResponseMeta, NoopHooks};
pub use websocket::{Opcode, WebSocketClient, WsError};
