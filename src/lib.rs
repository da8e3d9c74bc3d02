#[macro_use]
extern crate log;
#[macro_use]
extern crate derive_builder;
#[macro_use]
extern crate lazy_static;

pub mod browser_controller;
pub mod crawler;
pub mod extractor;
pub mod runner;
pub mod scroller;
pub mod site;
pub mod types;
pub mod uploader;
pub mod utils;
