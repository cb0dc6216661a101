pub mod llm_service;
pub mod metadata;
pub mod prompt_loader;
pub mod search_service;
pub mod tts_service;

pub use llm_service::{LlmService, TextGenerator, TextRequest};
pub use metadata::{read_metadata, write_metadata, ArtifactMetadata};
pub use prompt_loader::{PromptKind, PromptLoader, PromptTemplate};
pub use search_service::{SearchHit, WebSearch};
pub use tts_service::{SpeechRequest, SpeechSynthesizer, TtsService};
