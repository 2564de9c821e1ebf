#![allow(dead_code)]

pub mod leadscore_env;
pub mod synthetic;
