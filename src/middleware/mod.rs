mod client_ctx;

pub use client_ctx::{ClientCtx, ClientCtxInner, ADMIN_TOKEN_HEADER, SESSION_TOKEN_KEY};
