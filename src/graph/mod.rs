mod builder;

pub use builder::{
    build_dependency_graph, class_key, declaring_file, edge_usage_kind, index_symbols, method_key, GraphBuilder,
    Target,
};
