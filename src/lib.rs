#![warn(clippy::pedantic, elided_lifetimes_in_paths, explicit_outlives_requirements)]
#![allow(non_snake_case)]

use {
	core::fmt,
	log::warn,
	std::{
		io::{self, Write},
		path::{Path, PathBuf},
	},
	tempfile::NamedTempFile,
};

pub const TILE_SIZE: usize = 16;
pub const ROW_LEN: usize = 16;
pub const PALETTE_ENTRY_SIZE: usize = 2;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{} input file(s) not found: {}", .0.len(), displayPaths(.0))]
	MissingInputs(Vec<PathBuf>),

	#[error("cannot access {}", path.display())]
	Io { path: PathBuf, source: io::Error },

	#[error("{0:?} is not a valid C identifier")]
	InvalidName(String),

	#[error("{section} is {len} bytes long, which is not a multiple of {record}")]
	TrailingBytes { section: Section, len: usize, record: usize },

	#[error("cannot parse {}", path.display())]
	Config { path: PathBuf, source: toml::de::Error },

	#[error("cannot render the C source")]
	Render(#[source] io::Error),
}

fn displayPaths(paths: &[PathBuf]) -> String {
	paths.iter().map(|path| path.display().to_string()).collect::<Vec<_>>().join(", ")
}

pub type Result<T> = core::result::Result<T, Error>;

/// One kind of rgbgfx output. The declaration order is the order of the emitted arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
	TileData,
	TileMap,
	AttrMap,
	Palette,
}

impl Section {
	pub const COUNT: usize = 4;
	pub const ALL: [Self; Self::COUNT] = [Self::TileData, Self::TileMap, Self::AttrMap, Self::Palette];

	#[must_use]
	pub const fn recordSize(self) -> usize {
		match self {
			Self::TileData => TILE_SIZE,
			Self::TileMap | Self::AttrMap => ROW_LEN,
			Self::Palette => PALETTE_ENTRY_SIZE,
		}
	}

	#[must_use]
	pub const fn flag(self) -> &'static str {
		match self {
			Self::TileData => "tiledata",
			Self::TileMap => "tilemap",
			Self::AttrMap => "attrmap",
			Self::Palette => "palette",
		}
	}
}

impl fmt::Display for Section {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.flag())
	}
}

#[must_use]
pub fn isCIdentifier(name: &str) -> bool {
	let mut chars = name.chars();
	matches!(chars.next(), Some(first) if first == '_' || first.is_ascii_alphabetic())
		&& chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

pub mod assets {
	use {
		crate::{Error, Result, Section},
		log::debug,
		std::{
			fs,
			path::{Path, PathBuf},
		},
	};

	/// Input files asked for; `None` skips the section.
	#[derive(Clone, Debug, Default, PartialEq, Eq)]
	pub struct Paths {
		pub tileData: Option<PathBuf>,
		pub tileMap: Option<PathBuf>,
		pub attrMap: Option<PathBuf>,
		pub palette: Option<PathBuf>,
	}

	impl Paths {
		#[must_use]
		pub fn get(&self, section: Section) -> Option<&Path> {
			match section {
				Section::TileData => &self.tileData,
				Section::TileMap => &self.tileMap,
				Section::AttrMap => &self.attrMap,
				Section::Palette => &self.palette,
			}
			.as_deref()
		}

		pub fn iter(&self) -> impl Iterator<Item = (Section, &Path)> + '_ {
			Section::ALL.into_iter().filter_map(move |section| Some((section, self.get(section)?)))
		}

		#[must_use]
		pub fn missing(&self) -> Vec<PathBuf> {
			self.iter().filter(|(_, path)| !path.exists()).map(|(_, path)| path.to_owned()).collect()
		}
	}

	#[derive(Clone, Debug, Default, PartialEq, Eq)]
	pub struct Assets {
		buffers: [Option<Vec<u8>>; Section::COUNT],
	}

	impl Assets {
		/// Reads every requested file, or none of them if any is missing.
		pub fn load(paths: &Paths) -> Result<Self> {
			let missing = paths.missing();
			if !missing.is_empty() {
				return Err(Error::MissingInputs(missing));
			}
			let mut assets = Self::default();
			for (section, path) in paths.iter() {
				let bytes = fs::read(path).map_err(|source| Error::Io { path: path.to_owned(), source })?;
				debug!("{section}: {} bytes from {}", bytes.len(), path.display());
				assets.buffers[section as usize] = Some(bytes);
			}
			Ok(assets)
		}

		#[must_use]
		pub fn with(mut self, section: Section, bytes: Vec<u8>) -> Self {
			self.buffers[section as usize] = Some(bytes);
			self
		}

		#[must_use]
		pub fn get(&self, section: Section) -> Option<&[u8]> {
			self.buffers[section as usize].as_deref()
		}

		pub fn sections(&self) -> impl Iterator<Item = (Section, &[u8])> + '_ {
			Section::ALL.into_iter().filter_map(move |section| Some((section, self.get(section)?)))
		}

		/// Sections that end in a partial record, with how many bytes of it get dropped.
		pub fn trailingBytes(&self) -> impl Iterator<Item = (Section, usize)> + '_ {
			self.sections().filter_map(|(section, bytes)| match bytes.len() % section.recordSize() {
				0 => None,
				dropped => Some((section, dropped)),
			})
		}

		pub fn ensureWhole(&self) -> Result<()> {
			match self.trailingBytes().next() {
				None => Ok(()),
				Some((section, _)) => Err(Error::TrailingBytes {
					section,
					len: self.get(section).map_or(0, <[u8]>::len),
					record: section.recordSize(),
				}),
			}
		}
	}

}

pub mod gbdk {
	//! C source in the shape GBDK projects `#include`.

	use {
		crate::{assets::Assets, Section, PALETTE_ENTRY_SIZE, ROW_LEN, TILE_SIZE},
		byteorder::{ByteOrder, LE},
		std::io::{self, Write},
	};

	pub const INCLUDE: &str = "#include <gb/gb.h>\n";

	pub fn writeSource<W: Write + ?Sized>(out: &mut W, name: &str, assets: &Assets) -> io::Result<()> {
		out.write_all(INCLUDE.as_bytes())?;
		for (section, bytes) in assets.sections() {
			match section {
				Section::TileData => writeTileData(out, name, bytes)?,
				Section::TileMap => writeByteArray(out, &format!("{name}_tileMapData"), "Mapping", bytes)?,
				Section::AttrMap => writeByteArray(out, &format!("{name}_attrMapData"), "Attr", bytes)?,
				Section::Palette => writePalette(out, name, bytes)?,
			}
		}
		Ok(())
	}

	pub fn writeTileData<W: Write + ?Sized>(out: &mut W, name: &str, tileData: &[u8]) -> io::Result<()> {
		writeln!(out, "const UINT16 {name}_tileCount = {};", tileData.len() / TILE_SIZE)?;
		writeByteArray(out, &format!("{name}_tileData"), "Tile", tileData)
	}

	/// One commented row per 16 bytes; a partial last row is not written.
	pub fn writeByteArray<W: Write + ?Sized>(
		out: &mut W,
		identifier: &str,
		rowLabel: &str,
		bytes: &[u8],
	) -> io::Result<()> {
		writeln!(out, "const unsigned char {identifier}[] = {{")?;
		for (i, row) in bytes.chunks_exact(ROW_LEN).enumerate() {
			write!(out, "/* {rowLabel} {i} */ ")?;
			for byte in row {
				write!(out, "0x{byte:02X},")?;
			}
			writeln!(out)?;
		}
		writeln!(out, "}};")
	}

	/// Palette words are stored little-endian; the literals read big-endian.
	pub fn writePalette<W: Write + ?Sized>(out: &mut W, name: &str, palette: &[u8]) -> io::Result<()> {
		writeln!(out, "const UWORD {name}_palette[{}] = {{", palette.len() / PALETTE_ENTRY_SIZE)?;
		for entry in palette.chunks_exact(PALETTE_ENTRY_SIZE) {
			writeln!(out, "0x{:04X},", LE::read_u16(entry))?;
		}
		writeln!(out, "}};")
	}

	#[cfg(test)]
	mod tests {
		use super::*;

		fn render(name: &str, assets: &Assets) -> String {
			let mut out = Vec::new();
			writeSource(&mut out, name, assets).unwrap();
			String::from_utf8(out).unwrap()
		}

		#[test]
		fn singleBlankTile() {
			let source = render("image", &Assets::default().with(Section::TileData, vec![0; 16]));
			assert_eq!(
				source,
				concat!(
					"#include <gb/gb.h>\n",
					"const UINT16 image_tileCount = 1;\n",
					"const unsigned char image_tileData[] = {\n",
					"/* Tile 0 */ 0x00,0x00,0x00,0x00,0x00,0x00,0x00,0x00,",
					"0x00,0x00,0x00,0x00,0x00,0x00,0x00,0x00,\n",
					"};\n",
				)
			);
		}

		#[test]
		fn tileCountIgnoresPartialTile() {
			let tileData: Vec<u8> = (0..=40).collect();
			let source = render("bg", &Assets::default().with(Section::TileData, tileData));
			assert!(source.contains("const UINT16 bg_tileCount = 2;\n"));
			assert!(source.contains(
				"/* Tile 1 */ 0x10,0x11,0x12,0x13,0x14,0x15,0x16,0x17,0x18,0x19,0x1A,0x1B,0x1C,0x1D,0x1E,0x1F,\n"
			));
			assert!(!source.contains("Tile 2"));
			assert!(!source.contains("0x20"));
		}

		#[test]
		fn everyTileRowHasSixteenTokens() {
			for len in [0, 15, 16, 33, 64, 100] {
				let source = render("image", &Assets::default().with(Section::TileData, vec![0xFF; len]));
				let rows: Vec<_> = source.lines().filter(|line| line.starts_with("/* Tile ")).collect();
				assert_eq!(rows.len(), len / TILE_SIZE);
				for row in rows {
					assert_eq!(row.matches("0xFF,").count(), 16);
				}
			}
		}

		#[test]
		fn mapAndAttrLabels() {
			let source = render(
				"level",
				&Assets::default().with(Section::TileMap, vec![1; 16]).with(Section::AttrMap, vec![0x80; 16]),
			);
			assert!(!source.contains("tileCount"));
			assert!(source.contains("const unsigned char level_tileMapData[] = {\n/* Mapping 0 */ 0x01,"));
			assert!(source.contains("const unsigned char level_attrMapData[] = {\n/* Attr 0 */ 0x80,"));
		}

		#[test]
		fn paletteIsByteSwapped() {
			let source = render("image", &Assets::default().with(Section::Palette, vec![0x12, 0x34, 0xFF, 0x7F, 0x00]));
			assert!(source.ends_with("const UWORD image_palette[2] = {\n0x3412,\n0x7FFF,\n};\n"));
		}

		#[test]
		fn sectionsInFixedOrder() {
			let assets = Assets::default()
				.with(Section::Palette, vec![0, 0])
				.with(Section::AttrMap, vec![0; 16])
				.with(Section::TileMap, vec![0; 16])
				.with(Section::TileData, vec![0; 16]);
			let source = render("image", &assets);
			let offsets: Vec<_> = ["_tileData[]", "_tileMapData[]", "_attrMapData[]", "_palette["]
				.into_iter()
				.map(|needle| source.find(needle).unwrap())
				.collect();
			assert!(offsets.windows(2).all(|pair| pair[0] < pair[1]));
		}

		#[test]
		fn onlyIncludeWithoutInputs() {
			assert_eq!(render("image", &Assets::default()), INCLUDE);
		}
	}
}

pub mod config {
	//! Settings come in layers: command-line flags, then an optional TOML file, then defaults.

	use {
		crate::{assets::Paths, Error, Result},
		const_format::concatcp,
		serde::Deserialize,
		std::{
			fs,
			path::{Path, PathBuf},
		},
	};

	pub const DEFAULT_NAME: &str = "image";
	pub const DEFAULT_OUTPUT: &str = concatcp!(DEFAULT_NAME, ".c");
	pub const STDOUT: &str = "-";

	#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
	#[serde(deny_unknown_fields)]
	pub struct Layer {
		pub tiledata: Option<PathBuf>,
		pub tilemap: Option<PathBuf>,
		pub attrmap: Option<PathBuf>,
		pub palette: Option<PathBuf>,
		pub name: Option<String>,
		pub output: Option<PathBuf>,
		pub strict: Option<bool>,
	}

	impl Layer {
		/// Relative paths in the file are taken from the file's own directory.
		pub fn load(path: &Path) -> Result<Self> {
			let text = fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_owned(), source })?;
			let layer = Self::parse(&text).map_err(|source| Error::Config { path: path.to_owned(), source })?;
			Ok(layer.relativeTo(path.parent().unwrap_or_else(|| Path::new(""))))
		}

		pub fn parse(text: &str) -> core::result::Result<Self, toml::de::Error> {
			toml::from_str(text)
		}

		#[must_use]
		pub fn relativeTo(self, dir: &Path) -> Self {
			let rebase = |path: Option<PathBuf>| {
				path.map(|path| if path.is_absolute() || path == Path::new(STDOUT) { path } else { dir.join(path) })
			};
			Self {
				tiledata: rebase(self.tiledata),
				tilemap: rebase(self.tilemap),
				attrmap: rebase(self.attrmap),
				palette: rebase(self.palette),
				output: rebase(self.output),
				..self
			}
		}

		/// Fields unset in `self` are taken from `lower`.
		#[must_use]
		pub fn over(self, lower: Self) -> Self {
			Self {
				tiledata: self.tiledata.or(lower.tiledata),
				tilemap: self.tilemap.or(lower.tilemap),
				attrmap: self.attrmap.or(lower.attrmap),
				palette: self.palette.or(lower.palette),
				name: self.name.or(lower.name),
				output: self.output.or(lower.output),
				strict: self.strict.or(lower.strict),
			}
		}

		#[must_use]
		pub fn resolve(self) -> Settings {
			Settings {
				paths: Paths {
					tileData: self.tiledata,
					tileMap: self.tilemap,
					attrMap: self.attrmap,
					palette: self.palette,
				},
				name: self.name.unwrap_or_else(|| DEFAULT_NAME.to_owned()),
				output: self.output.unwrap_or_else(|| DEFAULT_OUTPUT.into()),
				strict: self.strict.unwrap_or(false),
			}
		}
	}

	#[derive(Clone, Debug, PartialEq, Eq)]
	pub struct Settings {
		pub paths: Paths,
		pub name: String,
		pub output: PathBuf,
		pub strict: bool,
	}

	impl Default for Settings {
		fn default() -> Self {
			Layer::default().resolve()
		}
	}

}

/// Loads the inputs and renders the whole C source in memory, so that nothing is written on failure.
pub fn convert(settings: &config::Settings) -> Result<Vec<u8>> {
	if !isCIdentifier(&settings.name) {
		return Err(Error::InvalidName(settings.name.clone()));
	}
	let assets = assets::Assets::load(&settings.paths)?;
	if settings.strict {
		assets.ensureWhole()?;
	}
	for (section, dropped) in assets.trailingBytes() {
		warn!("{section}: ignoring {dropped} trailing byte(s) after the last whole record");
	}
	let mut text = Vec::new();
	gbdk::writeSource(&mut text, &settings.name, &assets).map_err(Error::Render)?;
	Ok(text)
}

/// `-` means standard output. A file is written next to `path` first and renamed over it,
/// so a failed write leaves any previous output untouched.
pub fn writeOutput(path: &Path, text: &[u8]) -> Result<()> {
	let result = if path == Path::new(config::STDOUT) {
		let mut stdout = io::stdout().lock();
		stdout.write_all(text).and_then(|()| stdout.flush())
	} else {
		let dir = match path.parent() {
			Some(dir) if !dir.as_os_str().is_empty() => dir,
			_ => Path::new("."),
		};
		NamedTempFile::new_in(dir)
			.and_then(|mut file| {
				file.write_all(text)?;
				file.flush()?;
				Ok(file)
			})
			.and_then(|file| file.persist(path).map(drop).map_err(|err| err.error))
	};
	result.map_err(|source| Error::Io { path: path.to_owned(), source })
}
