pub mod accumulator;
pub mod gemini;
pub mod naming;
pub mod prompts;
pub mod storage;
