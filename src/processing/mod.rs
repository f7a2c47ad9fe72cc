pub mod compositor;
pub mod folder_stack;
pub mod layer_classification;
pub mod layer_export;
pub mod path_builder;
