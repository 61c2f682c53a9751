mod app;
mod asset;
mod config;
mod interaction;
mod pet;
mod platform;
mod render;
mod sequencer;
mod settings;
mod util;

fn main() {
    env_logger::init();
    log::info!("PetToy companion starting up");

    if let Err(e) = app::run() {
        log::error!("Fatal error: {e}");
        std::process::exit(1);
    }
}
