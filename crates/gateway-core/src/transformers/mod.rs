pub mod deepseek;
pub mod groq;
pub mod maxtoken;
pub mod openrouter;
mod reasoning;
pub mod tooluse;
