pub mod resource_tree;

pub use resource_tree::ResourceTree;
