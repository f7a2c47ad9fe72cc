pub mod layer_record;
pub mod png_writer;
pub mod psd_reader;
pub mod rle;
