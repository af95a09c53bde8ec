use crate::{Format, Result, decode, encode};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};

/// High-level converter between plist representations
pub struct Converter;

impl Converter {
    /// Convert a plist from a reader to a writer, re-encoding it in the
    /// requested output format. The input format is auto-detected.
    ///
    /// The whole input is buffered first: the binary decoder needs the
    /// trailer at the end of the buffer before it can read anything else.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use plistconv::{Converter, Format};
    /// use std::fs::File;
    ///
    /// let input = File::open("input.plist").unwrap();
    /// let output = File::create("output.plist").unwrap();
    /// Converter::convert(input, output, Format::Xml).unwrap();
    /// ```
    pub fn convert<R: Read, W: Write>(mut reader: R, mut writer: W, format: Format) -> Result<()> {
        let mut input = Vec::new();
        reader.read_to_end(&mut input)?;
        let output = Self::convert_bytes(&input, format)?;
        writer.write_all(&output)?;
        writer.flush()?;
        Ok(())
    }

    /// Convert an in-memory plist buffer to the requested output format.
    pub fn convert_bytes(data: &[u8], format: Format) -> Result<Vec<u8>> {
        let value = decode(data)?;
        encode(&value, format)
    }

    /// Convert a plist file to another file.
    pub fn convert_file(input_path: &str, output_path: &str, format: Format) -> Result<()> {
        if input_path == output_path {
            return Self::convert_file_in_place(input_path, format);
        }

        let reader = BufReader::new(File::open(input_path)?);
        let writer = BufWriter::new(File::create(output_path)?);
        Self::convert(reader, writer, format)
    }

    /// Convert a plist from stdin to stdout.
    pub fn convert_stdin_stdout(format: Format) -> Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        Self::convert(stdin.lock(), BufWriter::new(stdout.lock()), format)
    }

    /// Convert a plist from stdin to a file.
    pub fn convert_stdin_to_file(output_path: &str, format: Format) -> Result<()> {
        let stdin = io::stdin();
        let writer = BufWriter::new(File::create(output_path)?);
        Self::convert(stdin.lock(), writer, format)
    }

    /// Convert a plist file to stdout.
    pub fn convert_file_to_stdout(input_path: &str, format: Format) -> Result<()> {
        let reader = BufReader::new(File::open(input_path)?);
        Self::convert(reader, io::stdout(), format)
    }

    /// Convert a plist file in place (overwrites the original file).
    ///
    /// The result is only written back once the conversion has succeeded,
    /// so a malformed input never clobbers the original.
    fn convert_file_in_place(file_path: &str, format: Format) -> Result<()> {
        let mut input = Vec::new();
        BufReader::new(File::open(file_path)?).read_to_end(&mut input)?;

        let output = Self::convert_bytes(&input, format)?;

        let mut writer = BufWriter::new(File::create(file_path)?);
        writer.write_all(&output)?;
        writer.flush()?;
        Ok(())
    }
}
