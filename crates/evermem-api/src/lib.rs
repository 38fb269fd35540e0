//! EverMem cloud memory API: configuration, HTTP client and result shaping.

mod client;
mod config;
mod error;
mod transform;

pub use client::{
    add_body, generate_message_id, list_body, search_body, EverMemClient, MemoryApi, NewMemory,
    RawResponse, SearchOptions, Upstream, GROUP_NAME, MEMORIES_PATH, SEARCH_PATH,
};
pub use config::{default_group_id, key_id_for, Config, DEFAULT_API_URL, DEFAULT_TIMEOUT_MS, DEFAULT_USER_ID};
pub use error::ApiError;
pub use transform::{transform_list_results, transform_search_results, Memory, MemoryKind};
