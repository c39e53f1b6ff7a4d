mod app;
mod behavior;
mod model;
mod nav;
mod schema;
mod services;
mod session;
mod theme;
mod ui;
mod widgets;

use anyhow::Result;

fn main() -> Result<()> {
    ui::run()
}
