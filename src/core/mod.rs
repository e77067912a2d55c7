pub mod completion;
pub mod conversation;

// Re-export commonly used types for convenience
pub use completion::{
    BaseCompletion, BoxedCompletion, CompletionError, CompletionResult, CompletionStream,
    GroqCompletion, GroqCompletionConfig, PromptContext, PromptTurn, create_completion_provider,
    get_supported_completion_providers,
};

pub use conversation::{Conversation, Role, Turn};
