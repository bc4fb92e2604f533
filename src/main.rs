//! Umbra entry point
//!
//! Headless runner: loads a level, drives it for a number of ticks with a
//! fixed set of held keys and logs what each mover can see.
//!
//! Usage: `umbra [level.json] [ticks] [--settings path] [--precision low|medium|high]
//! [--hold KeyD,KeyS] [--realtime] [--write-settings]`

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use std::path::PathBuf;

    use umbra::Settings;
    use umbra::settings::Precision;
    use umbra::sim::{DEMO_LEVEL, FixedScheduler, TickInput, load_level, load_level_file, tick};

    env_logger::init();
    log::info!("Umbra (headless) starting...");

    let mut level_path: Option<PathBuf> = None;
    let mut ticks: u64 = 200;
    let mut settings_path = PathBuf::from("umbra-settings.json");
    let mut input = TickInput::default();
    let mut realtime = false;
    let mut precision: Option<Precision> = None;
    let mut write_settings = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => match args.next() {
                Some(path) => settings_path = PathBuf::from(path),
                None => log::warn!("--settings needs a path"),
            },
            "--hold" => match args.next() {
                Some(keys) => input = TickInput::with_keys(&keys.split(',').collect::<Vec<_>>()),
                None => log::warn!("--hold needs a comma-separated key list"),
            },
            "--precision" => match args.next().as_deref().and_then(Precision::from_str) {
                Some(p) => precision = Some(p),
                None => log::warn!("--precision needs low, medium or high"),
            },
            "--realtime" => realtime = true,
            "--write-settings" => write_settings = true,
            other => match other.parse::<u64>() {
                Ok(n) => ticks = n,
                Err(_) => level_path = Some(PathBuf::from(other)),
            },
        }
    }

    let mut settings = Settings::load(&settings_path);
    if let Some(preset) = precision {
        settings.apply_preset(preset);
        log::info!("Precision preset: {}", preset.as_str());
    }
    if write_settings {
        if let Err(e) = settings.save(&settings_path) {
            log::warn!("Could not save settings: {}", e);
        }
    }
    let loaded = match &level_path {
        Some(path) => load_level_file(path, settings),
        None => load_level(DEMO_LEVEL, settings),
    };
    let mut world = match loaded {
        Ok(world) => world,
        Err(e) => {
            log::error!("Could not load level: {}", e);
            std::process::exit(1);
        }
    };

    let dt = world.settings.tick_period();
    let mut scheduler = FixedScheduler::new(world.settings.tick_rate);
    let report_every = (world.settings.tick_rate as u64).max(1);

    while world.time_ticks < ticks {
        if realtime {
            let now = std::time::Instant::now();
            if !scheduler.poll(now) {
                std::thread::sleep(scheduler.until_next(now));
                continue;
            }
        }
        tick(&mut world, &input, dt);

        for contact in &world.contacts {
            log::debug!(
                "Contact {:?} -> {:?}: {:?}",
                contact.body,
                contact.obstacle,
                contact.outcome
            );
        }
        if world.time_ticks % report_every == 0 {
            for id in world.mover_ids() {
                let (Some(e), Some(view)) = (world.get(id), world.view(id)) else {
                    continue;
                };
                log::info!(
                    "Tick {}: mover {:?} at ({:.1}, {:.1}) sees {} vertices, area {:.0}",
                    world.time_ticks,
                    id,
                    e.pos.x(),
                    e.pos.y(),
                    view.len(),
                    view.area()
                );
            }
        }
    }

    log::info!("Done after {} ticks", world.time_ticks);
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // No browser front end; the library is the product on wasm
}
