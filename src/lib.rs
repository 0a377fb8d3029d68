extern crate clap;
#[macro_use] extern crate derive_more;
extern crate flate2;
extern crate intervaltree;
extern crate ipnet;
extern crate quick_xml;
extern crate regex;
#[macro_use] extern crate serde_derive;
extern crate serde;
extern crate serde_json;
#[macro_use] extern crate tracing;

pub mod address;
pub mod db;
pub mod hierarchy;
pub mod ip;
pub mod nets;
pub mod orgs;
pub mod report;
pub mod stream;
