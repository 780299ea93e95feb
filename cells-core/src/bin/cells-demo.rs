//! Cells demo binary
//!
//! Builds the diamond graph x0 -> {x1, x2} -> y -> z (z also reads x0),
//! attaches two printer cells, and replays a sequence of resets.
//!
//! Run with `cargo run --features demo --bin cells-demo`. Set
//! `RUST_LOG=cells_core=trace` to watch marks and commits.

use std::rc::Rc;

use cells_core::{Result, Runtime};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cells_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let runtime = Runtime::new();
    let [x0, x1, x2, y, z] = [(); 5].map(|_| runtime.cell::<f64>());
    let z_printer = runtime.cell::<()>();
    let x2_printer = runtime.cell::<()>();

    runtime.transaction(|| -> Result<()> {
        x0.reset_value(10.0)?;

        let a = Rc::clone(&x0);
        x1.reset(move || a.get() + 5.0)?;

        let a = Rc::clone(&x0);
        x2.reset(move || a.get() * 2.0)?;

        let (a, b) = (Rc::clone(&x1), Rc::clone(&x2));
        y.reset(move || a.get() * b.get())?;

        let (a, b) = (Rc::clone(&x0), Rc::clone(&y));
        z.reset(move || a.get() * b.get())?;

        let a = Rc::clone(&z);
        z_printer.reset(move || println!("z is now {}.", a.get()))?;

        let a = Rc::clone(&x2);
        x2_printer.reset(move || println!("x2 is now {}.", a.get()))?;
        Ok(())
    })??;

    x0.reset_value(15.0)?;
    x0.reset_value(-20.0)?;
    y.reset_value(-3.0)?;

    let a = Rc::clone(&x0);
    x1.reset(move || a.get())?;

    let (a, b) = (Rc::clone(&x1), Rc::clone(&x2));
    y.reset(move || a.get() + b.get())?;

    tracing::info!(stats = ?runtime.stats(), "done");
    Ok(())
}
