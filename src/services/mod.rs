pub mod allocator;
pub mod block_merger;
pub mod candidate_generator;
pub mod dependency_filter;
pub mod free_intervals;
pub mod plan_graph;
pub mod plan_graph_cache;
pub mod plan_store;
pub mod priority_scorer;
pub mod schedule_service;
pub mod schedule_utils;
