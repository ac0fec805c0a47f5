pub mod db;
pub mod tts;
pub mod tutor_llm;

pub use db::DbAdapter;
pub use tts::OpenAiTtsAdapter;
pub use tutor_llm::OpenAiTutorAdapter;
