mod audio;
mod document;
mod sentence;
mod speed;

pub use audio::AudioData;
pub use document::DocumentId;
pub use sentence::{Priority, Sentence};
pub use speed::Speed;
