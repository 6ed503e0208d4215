pub mod audio_adapter;
pub mod pcm;
pub mod ring_buffer;
