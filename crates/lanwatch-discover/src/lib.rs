//! lanwatch-discover: LAN discovery and monitoring engine.
//!
//! Probes address ranges for live hosts, merges what collaborators know
//! about each device, keeps scan jobs single-flight, schedules automatic
//! scans, runs nmap port scans in the background, tracks per-host latency
//! and exposes all of it over a REST API.

pub mod api;
pub mod collaborators;
pub mod config;
pub mod engine;
pub mod error;
pub mod latency;
pub mod merge;
pub mod nmap_xml;
pub mod orchestrator;
pub mod portscan;
pub mod probe;
pub mod range;
pub mod scanner;
pub mod scheduler;
pub mod settings;
pub mod vendors;
