mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use std::fs;

use larder::audio_toolkit::list_input_devices;
use larder::managers::describer::CameraFrame;
use larder::settings::Settings;
use larder::Session;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match cli::Args::parse().command {
        cli::Command::ListDevices => {
            for device in list_input_devices()? {
                println!("{}", device.name);
            }
            Ok(())
        }
        cli::Command::Run {
            settings,
            device,
            keyword,
            image,
        } => {
            let mut settings = Settings::load(&settings)?;
            if device.is_some() {
                settings.selected_microphone = device;
            }
            if let Some(keyword) = keyword {
                settings.command_keyword = keyword;
            }
            run(settings, image)
        }
    }
}

fn run(settings: Settings, images: Vec<std::path::PathBuf>) -> Result<()> {
    let session = Session::from_settings(settings)?;

    session.on_ingredients(Box::new(|snapshot| {
        println!("ingredients: {}", snapshot.join(", "));
    }));
    session.on_recipes(Box::new(|recipes| {
        if recipes.is_empty() {
            println!("no recipes");
            return;
        }
        for recipe in &recipes {
            println!("== {} ==\n{}\n{}\n", recipe.title, recipe.description, recipe.instructions);
        }
    }));

    for path in images {
        let bytes = fs::read(&path).with_context(|| format!("failed to read image {:?}", path))?;
        info!("submitting frame from {:?}", path);
        session.submit_frame(CameraFrame::new(bytes));
    }

    if let Err(e) = session.start_listening() {
        error!("voice loop unavailable: {e:#}");
    }

    let handle = session.handle();
    handle.block_on(async {
        tokio::signal::ctrl_c().await.ok();
    });

    info!("shutting down");
    session.shutdown();
    Ok(())
}
