pub mod freshness;
