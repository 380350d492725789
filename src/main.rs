#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	anyhow::Context,
	clap::Parser,
	log::{debug, error, info},
	std::path::PathBuf,
	tilemap2arr::{config::Layer, Error},
};

fn main() -> anyhow::Result<()> {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
		.format_timestamp(None)
		.init();

	/// Transforms output of rgbgfx into a .c file that GBDK can use
	#[derive(Parser)]
	#[clap(name = "tilemap2arr", version)]
	struct Args {
		/// Tile pixel data, 16 bytes per tile
		#[clap(short = 'd', long = "tiledata", value_name = "PATH", value_parser)]
		tileData: Option<PathBuf>,

		/// Tile indices
		#[clap(short = 't', long = "tilemap", value_name = "PATH", value_parser)]
		tileMap: Option<PathBuf>,

		/// Palette, little-endian 16-bit colours
		#[clap(short = 'p', long, value_name = "PATH", value_parser)]
		palette: Option<PathBuf>,

		/// Attribute map, parallel to the tilemap
		#[clap(short = 'a', long = "attrmap", value_name = "PATH", value_parser)]
		attrMap: Option<PathBuf>,

		/// Prefix of every emitted identifier [default: image]
		#[clap(short, long, value_parser)]
		name: Option<String>,

		/// Output file, `-` for standard output [default: image.c]
		#[clap(short, long, value_name = "PATH", value_parser)]
		output: Option<PathBuf>,

		/// TOML file with any of the settings above; flags take precedence
		#[clap(short, long, value_name = "PATH", value_parser)]
		config: Option<PathBuf>,

		/// Fail instead of dropping a trailing partial tile, row or palette entry
		#[clap(long)]
		strict: bool,
	}
	let Args { tileData, tileMap, palette, attrMap, name, output, config, strict } = Args::parse();

	let flags = Layer {
		tiledata: tileData,
		tilemap: tileMap,
		attrmap: attrMap,
		palette,
		name,
		output,
		strict: strict.then_some(true),
	};
	let settings = match config {
		None => flags,
		Some(path) => {
			debug!("settings from {}", path.display());
			flags.over(Layer::load(&path)?)
		}
	}
	.resolve();

	let text = tilemap2arr::convert(&settings)
		.map_err(|err| {
			if let Error::MissingInputs(paths) = &err {
				for path in paths {
					error!("{}: no such file", path.display());
				}
			}
			err
		})
		.context("nothing written")?;
	tilemap2arr::writeOutput(&settings.output, &text)?;

	info!(
		"wrote {} [{}]",
		settings.output.display(),
		settings.paths.iter().map(|(section, _)| section.flag()).collect::<Vec<_>>().join(", ")
	);
	Ok(())
}
