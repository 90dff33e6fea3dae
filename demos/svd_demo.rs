//! Decomposes a small fixed matrix and prints the factors and a quality report.
//!
//! Run with `RUST_LOG=debug cargo run --example svd_demo` to follow the stages.

use env_logger::Env;
use ndarray::array;
use std::error::Error;
use streaming_svd::{assess, StreamingSvd, SvdConfig};

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let a = array![
        [0.47084338, 0.99594452, 0.47982739, 0.69202168],
        [0.45148837, 0.72836647, 0.64691844, 0.62442883],
        [0.80974833, 0.82555856, 0.30709051, 0.58230306],
        [0.97898197, 0.98520343, 0.40133633, 0.85319924],
    ];
    let reference = [2.79495619, 0.44521050, 0.19458290, 0.07948970];

    let config = SvdConfig {
        max_iterations: 99,
        ..SvdConfig::default()
    };
    let output = StreamingSvd::<f64>::new(config).decompose(&a)?;

    println!("A =\n{:.8}", a);
    println!("U =\n{:.8}", output.u);
    println!("S =\n{:.8}", output.s);
    println!("V =\n{:.8}", output.v);
    println!("U·S·Vᴴ =\n{:.8}", output.reconstruct()?);

    let report = assess(&a.view(), &output, Some(&reference))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
