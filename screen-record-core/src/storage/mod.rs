pub mod checksum;
pub mod destination;
pub mod gallery;
pub mod metadata;
pub mod mp4_boxes;
pub mod mp4_writer;
