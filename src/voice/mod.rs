//! Voice input and speech output

pub mod input;
pub mod output;
pub mod speech;

pub use input::{run_typed_input, run_voice_input, ListenSignal, Transcriber, TranscriptionError};
pub use output::{run_speech_loop, SpeechHandle, SpeechQueue, SpeechRequest};
pub use speech::{
    create_sink, parse_voice_list, EspeakSink, LogSink, SaySink, SpeechSink, Tone, Utterance,
};
