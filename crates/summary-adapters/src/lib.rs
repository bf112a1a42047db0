//! rusty-forum/crates/summary-adapters/src/lib.rs
//!
//! Driven adapters for the `SummaryProvider` port. Two wire-incompatible
//! HTTP providers (OpenAI-style chat completions, Gemini-style
//! generateContent) adapt to the one domain contract; both report
//! `ProviderError::Unavailable` without a network call when no API key is
//! configured.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiSummarizer;
pub use openai::OpenAiSummarizer;

use domains::ports::SummarySubject;

/// Shared prompt preamble; providers splice it into their own wire shapes.
fn instruction(subject: SummarySubject, max_chars: usize) -> String {
    match subject {
        SummarySubject::Post => format!(
            "Summarize the following forum post in at most {max_chars} characters. \
             Reply with the summary text only."
        ),
        SummarySubject::Thread => format!(
            "Summarize the main points of the following forum comment thread in at \
             most {max_chars} characters. Reply with the summary text only."
        ),
    }
}
