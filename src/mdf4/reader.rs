//! MDF 4.10 reader
//!
//! Reads back files produced by [`write_mdf4`](super::write_mdf4): sorted
//! data groups, one channel group each, little-endian float channels.
//! Everything else is rejected with `Error::Mdf4`.

use super::blocks::{
    byte, le_u16, le_u32, le_u64, read_block, read_optional_text, read_text, BlockId,
    ID_BLOCK_SIZE, FILE_ID,
};
use super::writer::{CN_TYPE_MASTER, DATA_TYPE_FLOAT_LE, VALUE_BYTES};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::Path;

/// Channel descriptor from a `CN` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Channel name
    pub name: String,
    /// Physical unit
    pub unit: String,
    /// Description
    pub comment: String,
    /// Whether this is the group's master channel
    pub master: bool,
    /// Offset of the value within a record
    pub byte_offset: u32,
    /// Value width in bits
    pub bit_count: u32,
}

/// One data group with its single channel group.
#[derive(Debug, Clone)]
pub struct ChannelGroup {
    /// Acquisition name
    pub name: String,
    /// Number of records
    pub cycle_count: u64,
    /// Bytes per record
    pub record_bytes: u32,
    /// Channels in record order
    pub channels: Vec<ChannelInfo>,
    records: Vec<u8>,
}

impl ChannelGroup {
    /// Look up a channel by name
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// The master channel, if any
    #[must_use]
    pub fn master(&self) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.master)
    }

    /// Decode every value of one channel.
    ///
    /// # Errors
    ///
    /// Returns `Mdf4` if the channel does not exist.
    pub fn values(&self, name: &str) -> Result<Vec<f64>> {
        let info = self.channel(name).ok_or_else(|| {
            Error::Mdf4(format!("group '{}' has no channel '{name}'", self.name))
        })?;
        let stride = self.record_bytes as usize;
        let at = info.byte_offset as usize;
        self.records
            .chunks_exact(stride)
            .map(|record| super::blocks::le_f64(record, at))
            .collect()
    }
}

/// A parsed MDF4 file.
#[derive(Debug, Clone)]
pub struct Mdf4File {
    /// Numeric format version (410)
    pub version: u16,
    /// Program identifier from the ID block
    pub program: String,
    /// Measurement start (ns since the Unix epoch)
    pub start_time_ns: u64,
    /// `<HDcomment>` XML
    pub comment: String,
    groups: Vec<ChannelGroup>,
}

impl Mdf4File {
    /// Read and parse a file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid MDF4 image.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::parse(&bytes)
    }

    /// Parse a file image.
    ///
    /// # Errors
    ///
    /// Returns `Mdf4` on a bad magic, a truncated or unknown block, a link
    /// past the end of the file, a link cycle, or an unsupported channel
    /// encoding.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ID_BLOCK_SIZE {
            return Err(Error::Mdf4(format!(
                "file too short for an ID block: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[..8] != FILE_ID {
            return Err(Error::Mdf4("missing 'MDF' file identifier".to_string()));
        }
        if !bytes[8..16].starts_with(b"4.") {
            return Err(Error::Mdf4(format!(
                "unsupported version '{}'",
                String::from_utf8_lossy(&bytes[8..16]).trim()
            )));
        }
        let version = le_u16(bytes, 28)?;
        let program = String::from_utf8_lossy(&bytes[16..24]).trim().to_string();

        let hd = read_block(bytes, ID_BLOCK_SIZE as u64, BlockId::Hd)?;
        let start_time_ns = le_u64(hd.data, 0)?;
        let comment = read_optional_text(bytes, hd.link(5), BlockId::Md)?;

        let mut groups = Vec::new();
        let mut seen = HashSet::new();
        let mut next = hd.link(0);
        while next != 0 {
            if !seen.insert(next) {
                return Err(Error::Mdf4(format!("data group chain loops at offset {next}")));
            }
            let dg = read_block(bytes, next, BlockId::Dg)?;
            groups.push(read_group(bytes, &dg)?);
            next = dg.link(0);
        }

        Ok(Self {
            version,
            program,
            start_time_ns,
            comment,
            groups,
        })
    }

    /// All groups in file order
    #[must_use]
    pub fn groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    /// Look up a group by acquisition name
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&ChannelGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn require_group(&self, name: &str) -> Result<&ChannelGroup> {
        self.group(name)
            .ok_or_else(|| Error::Mdf4(format!("no channel group named '{name}'")))
    }

    /// Channel names of one group in record order.
    ///
    /// # Errors
    ///
    /// Returns `Mdf4` if the group does not exist.
    pub fn channel_names(&self, group: &str) -> Result<Vec<&str>> {
        Ok(self
            .require_group(group)?
            .channels
            .iter()
            .map(|c| c.name.as_str())
            .collect())
    }

    /// Every value of one channel of one group.
    ///
    /// # Errors
    ///
    /// Returns `Mdf4` if the group or channel does not exist.
    pub fn channel_values(&self, group: &str, name: &str) -> Result<Vec<f64>> {
        self.require_group(group)?.values(name)
    }

    /// Listing of groups and channels for the console.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "MDF {} (program '{}'), {} group(s)",
            self.version,
            self.program,
            self.groups.len()
        );
        for g in &self.groups {
            let _ = writeln!(
                out,
                "\n[{}] {} records x {} bytes, {} channels",
                g.name,
                g.cycle_count,
                g.record_bytes,
                g.channels.len()
            );
            for c in &g.channels {
                let _ = writeln!(
                    out,
                    "  {:<32} {:<8} {}{}",
                    c.name,
                    c.unit,
                    c.comment,
                    if c.master { " (master)" } else { "" }
                );
            }
        }
        out
    }
}

fn read_group(bytes: &[u8], dg: &super::blocks::RawBlock<'_>) -> Result<ChannelGroup> {
    let rec_id_size = byte(dg.data, 0)?;
    if rec_id_size != 0 {
        return Err(Error::Mdf4(format!(
            "unsorted data group at offset {} (record id size {rec_id_size})",
            dg.offset
        )));
    }

    let cg = read_block(bytes, dg.link(1), BlockId::Cg)?;
    if cg.link(0) != 0 {
        return Err(Error::Mdf4(format!(
            "data group at offset {} holds more than one channel group",
            dg.offset
        )));
    }
    let name = read_optional_text(bytes, cg.link(2), BlockId::Tx)?;
    let cycle_count = le_u64(cg.data, 8)?;
    let record_bytes = le_u32(cg.data, 24)?;
    if record_bytes == 0 {
        return Err(Error::Mdf4(format!("channel group '{name}' has empty records")));
    }

    let mut channels = Vec::new();
    let mut seen = HashSet::new();
    let mut next = cg.link(1);
    while next != 0 {
        if !seen.insert(next) {
            return Err(Error::Mdf4(format!("channel chain loops at offset {next}")));
        }
        let cn = read_block(bytes, next, BlockId::Cn)?;
        channels.push(read_channel(bytes, &cn, record_bytes)?);
        next = cn.link(0);
    }

    let expected = usize::try_from(cycle_count)
        .ok()
        .and_then(|n| n.checked_mul(record_bytes as usize))
        .ok_or_else(|| Error::Mdf4(format!("group '{name}': record count overflows")))?;
    let records = if dg.link(2) == 0 {
        Vec::new()
    } else {
        read_block(bytes, dg.link(2), BlockId::Dt)?.data.to_vec()
    };
    if records.len() < expected {
        return Err(Error::Mdf4(format!(
            "group '{name}': data block holds {} bytes, {cycle_count} records need {expected}",
            records.len()
        )));
    }

    Ok(ChannelGroup {
        name,
        cycle_count,
        record_bytes,
        channels,
        records: records[..expected].to_vec(),
    })
}

fn read_channel(
    bytes: &[u8],
    cn: &super::blocks::RawBlock<'_>,
    record_bytes: u32,
) -> Result<ChannelInfo> {
    let name = read_text(bytes, cn.link(2), BlockId::Tx)?;
    let cn_type = byte(cn.data, 0)?;
    let data_type = byte(cn.data, 2)?;
    let byte_offset = le_u32(cn.data, 4)?;
    let bit_count = le_u32(cn.data, 8)?;
    if data_type != DATA_TYPE_FLOAT_LE || bit_count != 64 {
        return Err(Error::Mdf4(format!(
            "channel '{name}': unsupported encoding (data type {data_type}, {bit_count} bits)"
        )));
    }
    if u64::from(byte_offset) + u64::from(VALUE_BYTES) > u64::from(record_bytes) {
        return Err(Error::Mdf4(format!(
            "channel '{name}': offset {byte_offset} outside {record_bytes}-byte record"
        )));
    }
    Ok(ChannelInfo {
        unit: read_optional_text(bytes, cn.link(6), BlockId::Tx)?,
        comment: read_optional_text(bytes, cn.link(7), BlockId::Tx)?,
        master: cn_type == CN_TYPE_MASTER,
        name,
        byte_offset,
        bit_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StudyConfig;
    use crate::mdf4::{encode_mdf4, Mdf4Header};
    use crate::telemetry::{generate_dataset, Channel, Setup};
    use chrono::Utc;

    fn image() -> (Vec<u8>, crate::telemetry::TelemetryDataset) {
        let config = StudyConfig::builder().laps_per_setup(1).sample_rate_hz(20).build();
        let ds = generate_dataset(&config).unwrap();
        let header = Mdf4Header::new(&config.mdf4, Utc::now());
        (encode_mdf4(&ds, &header).unwrap(), ds)
    }

    #[test]
    fn test_parse_structure() {
        let (bytes, ds) = image();
        let file = Mdf4File::parse(&bytes).unwrap();
        assert_eq!(file.version, 410);
        assert_eq!(file.groups().len(), 2);
        assert!(file.comment.contains("<e name=\"project\">"));

        let baseline = file.group("baseline").unwrap();
        assert_eq!(baseline.cycle_count, ds.frame(Setup::Baseline).len() as u64);
        assert_eq!(baseline.channels.len(), Channel::COUNT);
        assert_eq!(baseline.master().unwrap().name, "time");
        assert_eq!(baseline.channel("speed_kmh").unwrap().unit, "km/h");
    }

    #[test]
    fn test_values_bit_exact() {
        let (bytes, ds) = image();
        let file = Mdf4File::parse(&bytes).unwrap();
        for setup in Setup::ALL {
            let values = file.channel_values(setup.label(), "glicko_volatility_sigma").unwrap();
            assert_eq!(values, ds.column(setup, Channel::Volatility));
        }
    }

    #[test]
    fn test_missing_group_or_channel() {
        let (bytes, _) = image();
        let file = Mdf4File::parse(&bytes).unwrap();
        assert!(file.channel_names("qualifying").is_err());
        assert!(file.channel_values("baseline", "boost_bar").is_err());
    }

    #[test]
    fn test_rejects_bad_magic() {
        let (mut bytes, _) = image();
        bytes[..3].copy_from_slice(b"XYZ");
        let err = Mdf4File::parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::Mdf4(_)));
    }

    #[test]
    fn test_rejects_truncated_file() {
        let (bytes, _) = image();
        assert!(Mdf4File::parse(&bytes[..40]).is_err());
        assert!(Mdf4File::parse(&bytes[..bytes.len() / 2]).is_err());
    }

    /// Offset of the first CN block's `byte_offset` field
    fn first_cn_byte_offset(bytes: &[u8]) -> usize {
        let cn = bytes.windows(4).position(|w| w == b"##CN").unwrap();
        // header (24) + 8 links (64) + type/sync/data type/bit offset (4)
        cn + 24 + 64 + 4
    }

    #[test]
    fn test_rejects_channel_offset_overflow() {
        let (mut bytes, _) = image();
        let at = first_cn_byte_offset(&bytes);
        bytes[at..at + 4].copy_from_slice(&0xFFFF_FFF8_u32.to_le_bytes());
        let err = Mdf4File::parse(&bytes).unwrap_err();
        assert!(matches!(err, Error::Mdf4(ref m) if m.contains("outside")), "{err}");
    }

    #[test]
    fn test_rejects_channel_past_record_end() {
        let (mut bytes, _) = image();
        let at = first_cn_byte_offset(&bytes);
        let record_bytes = (Channel::COUNT * 8) as u32;
        bytes[at..at + 4].copy_from_slice(&(record_bytes - 4).to_le_bytes());
        assert!(matches!(Mdf4File::parse(&bytes), Err(Error::Mdf4(_))));
    }

    #[test]
    fn test_render_lists_channels() {
        let (bytes, _) = image();
        let text = Mdf4File::parse(&bytes).unwrap().render();
        assert!(text.contains("[optimized]"));
        assert!(text.contains("speed_kmh"));
        assert!(text.contains("(master)"));
    }
}
