pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod routes;

pub mod crypto {
    pub mod aes;
    pub mod kdf;
    pub mod pin;
    pub mod pin_cipher;
    pub mod password;
    pub mod csrf;
}

pub mod models {
    pub mod message;
    pub mod user;
    pub mod session;
}

pub mod repositories {
    pub mod message;
    pub mod message_memory;
    pub mod user;
    pub mod user_memory;
    pub mod session;
}

pub mod services {
    pub mod attempts;
    pub mod messages;
    pub mod auth;
    pub mod stats;
}

pub mod handlers {
    pub mod messages;
    pub mod auth;
    pub mod stats;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod csrf;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}
