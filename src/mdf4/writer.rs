//! Sorted MDF 4.10 writer
//!
//! File layout:
//!
//! ```text
//! ID  HD ─ MD (HDcomment)
//!      ├─ FH ─ MD (FHcomment)
//!      └─ DG (baseline) ─ CG ─ TX (acquisition name)
//!         │                └─ CN time (master) ─ CN … (34 more)
//!         │                     └─ TX name / TX unit / TX comment
//!         ├─ DT (row-major f64 records)
//!         └─ DG (optimized) …
//! ```
//!
//! Any set of equal-length `f64` columns can be written the same way through
//! [`GroupData`] and [`encode_groups`].

use super::blocks::{BlockId, BlockWriter};
use crate::config::Mdf4Metadata;
use crate::telemetry::{Channel, TelemetryDataset, TelemetryFrame};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::info;

/// `cn_type`: value channel
pub const CN_TYPE_VALUE: u8 = 0;
/// `cn_type`: master channel
pub const CN_TYPE_MASTER: u8 = 2;
/// `cn_sync_type`: time
pub const SYNC_TIME: u8 = 1;
/// `cn_data_type`: IEEE 754 float, little-endian
pub const DATA_TYPE_FLOAT_LE: u8 = 4;
/// `cn_flags` bit 4: limit range valid
pub const CN_FLAG_LIMIT_VALID: u32 = 0x10;
/// Bytes per value
pub const VALUE_BYTES: u32 = 8;

/// Link slots of the blocks that get back-patched
mod link {
    pub const HD_DG_FIRST: usize = 0;
    pub const HD_FH_FIRST: usize = 1;
    pub const HD_MD_COMMENT: usize = 5;
    pub const DG_NEXT: usize = 0;
    pub const DG_CG_FIRST: usize = 1;
    pub const DG_DATA: usize = 2;
    pub const CG_CN_FIRST: usize = 1;
    pub const CN_NEXT: usize = 0;
}

/// Header metadata of an MDF4 export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mdf4Header {
    /// Author field
    pub author: String,
    /// Department field
    pub department: String,
    /// Project field
    pub project: String,
    /// Subject field
    pub subject: String,
    /// Free-text file description
    pub description: String,
    /// Measurement start
    pub start_time: DateTime<Utc>,
}

impl Mdf4Header {
    /// Header from configured metadata and a start time
    #[must_use]
    pub fn new(metadata: &Mdf4Metadata, start_time: DateTime<Utc>) -> Self {
        Self {
            author: metadata.author.clone(),
            department: metadata.department.clone(),
            project: metadata.project.clone(),
            subject: metadata.subject.clone(),
            description: "Synthetic Jerez telemetry, baseline vs optimized gearing".to_string(),
            start_time,
        }
    }

    /// Replace the file description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// `<HDcomment>` XML body
    #[must_use]
    pub fn comment_xml(&self) -> String {
        format!(
            "<HDcomment><TX>{}</TX>\
             <common_properties>\
             <e name=\"author\">{}</e>\
             <e name=\"department\">{}</e>\
             <e name=\"project\">{}</e>\
             <e name=\"subject\">{}</e>\
             </common_properties></HDcomment>",
            xml_escape(&self.description),
            xml_escape(&self.author),
            xml_escape(&self.department),
            xml_escape(&self.project),
            xml_escape(&self.subject),
        )
    }
}

/// Escape the five XML special characters.
#[must_use]
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// One channel of a [`GroupData`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelSpec<'a> {
    /// Channel name
    pub name: &'a str,
    /// Physical unit
    pub unit: &'a str,
    /// Description
    pub comment: &'a str,
    /// Time master of the group
    pub master: bool,
    /// Physical limits, written as the limit range
    pub limits: Option<(f64, f64)>,
}

impl ChannelSpec<'static> {
    /// Descriptor of a telemetry channel
    #[must_use]
    pub fn of(channel: Channel) -> Self {
        Self {
            name: channel.name(),
            unit: channel.unit(),
            comment: channel.comment(),
            master: channel == Channel::Time,
            limits: channel.bounds(),
        }
    }
}

/// One data group: named channels over equal-length `f64` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupData<'a> {
    /// Acquisition name of the channel group
    pub acquisition: &'a str,
    /// Channels in record order
    pub channels: Vec<ChannelSpec<'a>>,
    /// One column per channel
    pub columns: Vec<&'a [f64]>,
}

impl<'a> GroupData<'a> {
    /// All 35 channels of a telemetry frame, named after its setup
    #[must_use]
    pub fn from_frame(frame: &'a TelemetryFrame) -> Self {
        Self {
            acquisition: frame.setup().label(),
            channels: Channel::ALL.into_iter().map(ChannelSpec::of).collect(),
            columns: Channel::ALL.into_iter().map(|c| frame.column(c)).collect(),
        }
    }

    /// Record count
    #[must_use]
    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }

    fn validate(&self) -> Result<()> {
        if self.channels.is_empty() || self.channels.len() != self.columns.len() {
            return Err(Error::Mdf4(format!(
                "group '{}': {} channels for {} columns",
                self.acquisition,
                self.channels.len(),
                self.columns.len()
            )));
        }
        let rows = self.rows();
        if let Some((spec, col)) = self
            .channels
            .iter()
            .zip(&self.columns)
            .find(|(_, c)| c.len() != rows)
        {
            return Err(Error::Mdf4(format!(
                "group '{}': channel '{}' has {} values, expected {rows}",
                self.acquisition,
                spec.name,
                col.len()
            )));
        }
        if self.channels.iter().filter(|c| c.master).count() > 1 {
            return Err(Error::Mdf4(format!(
                "group '{}' has more than one master channel",
                self.acquisition
            )));
        }
        Ok(())
    }
}

fn start_ns(time: &DateTime<Utc>) -> Result<u64> {
    time.timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .ok_or_else(|| Error::Mdf4(format!("start time {time} not representable in MDF4")))
}

fn hd_data(start_ns: u64) -> Vec<u8> {
    let mut d = Vec::with_capacity(32);
    d.extend_from_slice(&start_ns.to_le_bytes());
    d.extend_from_slice(&0_i16.to_le_bytes()); // tz offset (min)
    d.extend_from_slice(&0_i16.to_le_bytes()); // dst offset (min)
    d.push(0); // time flags: UTC
    d.push(0); // time class: local PC
    d.push(0); // flags
    d.push(0);
    d.extend_from_slice(&0.0_f64.to_le_bytes()); // start angle
    d.extend_from_slice(&0.0_f64.to_le_bytes()); // start distance
    d
}

fn fh_data(start_ns: u64) -> Vec<u8> {
    let mut d = Vec::with_capacity(16);
    d.extend_from_slice(&start_ns.to_le_bytes());
    d.extend_from_slice(&0_i16.to_le_bytes());
    d.extend_from_slice(&0_i16.to_le_bytes());
    d.push(0);
    d.extend_from_slice(&[0; 3]);
    d
}

fn cg_data(cycle_count: u64, record_bytes: u32) -> Vec<u8> {
    let mut d = Vec::with_capacity(32);
    d.extend_from_slice(&0_u64.to_le_bytes()); // record id
    d.extend_from_slice(&cycle_count.to_le_bytes());
    d.extend_from_slice(&0_u16.to_le_bytes()); // flags
    d.extend_from_slice(&u16::from(b'.').to_le_bytes()); // path separator
    d.extend_from_slice(&[0; 4]);
    d.extend_from_slice(&record_bytes.to_le_bytes());
    d.extend_from_slice(&0_u32.to_le_bytes()); // invalidation bytes
    d
}

fn cn_data(spec: &ChannelSpec<'_>, byte_offset: u32) -> Vec<u8> {
    let (cn_type, sync) = if spec.master {
        (CN_TYPE_MASTER, SYNC_TIME)
    } else {
        (CN_TYPE_VALUE, 0)
    };
    let (flags, (lo, hi)) = match spec.limits {
        Some(bounds) => (CN_FLAG_LIMIT_VALID, bounds),
        None => (0, (0.0, 0.0)),
    };

    let mut d = Vec::with_capacity(72);
    d.push(cn_type);
    d.push(sync);
    d.push(DATA_TYPE_FLOAT_LE);
    d.push(0); // bit offset
    d.extend_from_slice(&byte_offset.to_le_bytes());
    d.extend_from_slice(&(VALUE_BYTES * 8).to_le_bytes()); // bit count
    d.extend_from_slice(&flags.to_le_bytes());
    d.extend_from_slice(&0_u32.to_le_bytes()); // invalidation bit position
    d.push(u8::MAX); // precision: unrestricted
    d.push(0);
    d.extend_from_slice(&0_u16.to_le_bytes()); // attachments
    // value range, limit range, extended limit range
    for v in [0.0, 0.0, lo, hi, 0.0, 0.0] {
        d.extend_from_slice(&f64::to_le_bytes(v));
    }
    d
}

fn records(group: &GroupData<'_>) -> Vec<u8> {
    let rows = group.rows();
    let mut d = Vec::with_capacity(rows * group.columns.len() * VALUE_BYTES as usize);
    for row in 0..rows {
        for column in &group.columns {
            d.extend_from_slice(&column[row].to_le_bytes());
        }
    }
    d
}

fn write_group(w: &mut BlockWriter, group: &GroupData<'_>) -> Result<u64> {
    let record_bytes = u32::try_from(group.channels.len())
        .ok()
        .and_then(|n| n.checked_mul(VALUE_BYTES))
        .ok_or_else(|| Error::Mdf4(format!("group '{}' record too wide", group.acquisition)))?;
    let dg = w.push_block(BlockId::Dg, &[0; 4], &[0; 8]);
    let acq_name = w.push_text(BlockId::Tx, group.acquisition);
    let cg = w.push_block(
        BlockId::Cg,
        &[0, 0, acq_name, 0, 0, 0],
        &cg_data(group.rows() as u64, record_bytes),
    );
    w.set_link(dg, link::DG_CG_FIRST, cg)?;

    let mut previous: Option<u64> = None;
    for (i, spec) in group.channels.iter().enumerate() {
        let name = w.push_text(BlockId::Tx, spec.name);
        let unit = w.push_text(BlockId::Tx, spec.unit);
        let comment = w.push_text(BlockId::Tx, spec.comment);
        #[allow(clippy::cast_possible_truncation)]
        let byte_offset = i as u32 * VALUE_BYTES;
        let cn = w.push_block(
            BlockId::Cn,
            &[0, 0, name, 0, 0, 0, unit, comment],
            &cn_data(spec, byte_offset),
        );
        match previous {
            Some(prev) => w.set_link(prev, link::CN_NEXT, cn)?,
            None => w.set_link(cg, link::CG_CN_FIRST, cn)?,
        }
        previous = Some(cn);
    }

    let dt = w.push_block(BlockId::Dt, &[], &records(group));
    w.set_link(dg, link::DG_DATA, dt)?;
    Ok(dg)
}

/// Encode a dataset as an MDF 4.10 file image, one group per setup.
///
/// # Errors
///
/// Returns `Mdf4` if the start time cannot be encoded.
pub fn encode_mdf4(dataset: &TelemetryDataset, header: &Mdf4Header) -> Result<Vec<u8>> {
    let groups: Vec<GroupData<'_>> = dataset
        .frames()
        .into_iter()
        .map(GroupData::from_frame)
        .collect();
    encode_groups(&groups, header)
}

/// Encode arbitrary channel groups as an MDF 4.10 file image.
///
/// # Errors
///
/// Returns `Mdf4` if a group is malformed (no channels, columns of unequal
/// length, several masters) or the start time cannot be encoded.
pub fn encode_groups(groups: &[GroupData<'_>], header: &Mdf4Header) -> Result<Vec<u8>> {
    for group in groups {
        group.validate()?;
    }
    let start = start_ns(&header.start_time)?;
    let mut w = BlockWriter::new();

    let hd = w.push_block(BlockId::Hd, &[0; 6], &hd_data(start));
    let hd_comment = w.push_text(BlockId::Md, &header.comment_xml());
    w.set_link(hd, link::HD_MD_COMMENT, hd_comment)?;

    let fh = w.push_block(BlockId::Fh, &[0, 0], &fh_data(start));
    let fh_comment = w.push_text(
        BlockId::Md,
        &format!(
            "<FHcomment><TX>created</TX><tool_id>jerez-study</tool_id>\
             <tool_vendor>{}</tool_vendor><tool_version>{}</tool_version></FHcomment>",
            xml_escape(&header.department),
            env!("CARGO_PKG_VERSION")
        ),
    );
    w.set_link(fh, 1, fh_comment)?;
    w.set_link(hd, link::HD_FH_FIRST, fh)?;

    let mut previous: Option<u64> = None;
    for group in groups {
        let dg = write_group(&mut w, group)?;
        match previous {
            Some(prev) => w.set_link(prev, link::DG_NEXT, dg)?,
            None => w.set_link(hd, link::HD_DG_FIRST, dg)?,
        }
        previous = Some(dg);
    }
    Ok(w.into_bytes())
}

/// Write a dataset to an MDF 4.10 file, creating parent directories.
///
/// Returns the file size in bytes.
///
/// # Errors
///
/// Returns error if encoding fails or the file cannot be written.
pub fn write_mdf4<P: AsRef<Path>>(
    dataset: &TelemetryDataset,
    header: &Mdf4Header,
    path: P,
) -> Result<u64> {
    let groups: Vec<GroupData<'_>> = dataset
        .frames()
        .into_iter()
        .map(GroupData::from_frame)
        .collect();
    write_groups(&groups, header, path)
}

/// Write channel groups to an MDF 4.10 file, creating parent directories.
///
/// Returns the file size in bytes.
///
/// # Errors
///
/// Returns error if encoding fails or the file cannot be written.
pub fn write_groups<P: AsRef<Path>>(
    groups: &[GroupData<'_>],
    header: &Mdf4Header,
    path: P,
) -> Result<u64> {
    let path = path.as_ref();
    let bytes = encode_groups(groups, header)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &bytes)?;
    info!(
        path = %path.display(),
        bytes = bytes.len(),
        groups = groups.len(),
        channels = groups.iter().map(|g| g.channels.len()).sum::<usize>(),
        "MDF4 file written"
    );
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mdf4::blocks::{le_f64, le_u16, le_u32, ID_BLOCK_SIZE};

    #[test]
    fn test_fixed_block_sizes() {
        assert_eq!(hd_data(0).len(), 32);
        assert_eq!(fh_data(0).len(), 16);
        assert_eq!(cg_data(1, 280).len(), 32);
        assert_eq!(cn_data(&ChannelSpec::of(Channel::Speed), 40).len(), 72);
    }

    #[test]
    fn test_master_channel_flags() {
        let time = cn_data(&ChannelSpec::of(Channel::Time), 0);
        assert_eq!((time[0], time[1], time[2]), (CN_TYPE_MASTER, SYNC_TIME, DATA_TYPE_FLOAT_LE));
        let speed = cn_data(&ChannelSpec::of(Channel::Speed), 40);
        assert_eq!((speed[0], speed[1]), (CN_TYPE_VALUE, 0));
        assert_eq!(u32::from_le_bytes(speed[4..8].try_into().unwrap()), 40);
    }

    #[test]
    fn test_bounded_channel_sets_limit_range() {
        let channel = Channel::ALL
            .into_iter()
            .find(|c| c.bounds().is_some())
            .unwrap();
        let (lo, hi) = channel.bounds().unwrap();
        let d = cn_data(&ChannelSpec::of(channel), 8);
        let flags = le_u32(&d, 12).unwrap();
        assert_eq!(flags, 0x10);
        assert_eq!(flags & 0x08, 0, "value range must not be flagged valid");
        let slot = |i: usize| le_f64(&d, 24 + 8 * i).unwrap();
        assert_eq!((slot(0), slot(1)), (0.0, 0.0));
        assert_eq!((slot(2), slot(3)), (lo, hi));
        assert_eq!((slot(4), slot(5)), (0.0, 0.0));
    }

    #[test]
    fn test_unbounded_channel_has_no_range_flags() {
        let channel = Channel::ALL
            .into_iter()
            .find(|c| c.bounds().is_none())
            .unwrap();
        assert_eq!(le_u32(&cn_data(&ChannelSpec::of(channel), 0), 12).unwrap(), 0);
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("R&D <team>"), "R&amp;D &lt;team&gt;");
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[test]
    fn test_start_time_before_epoch_rejected() {
        let t = DateTime::<Utc>::from_timestamp(-10, 0).unwrap();
        assert!(matches!(start_ns(&t), Err(Error::Mdf4(_))));
    }

    #[test]
    fn test_header_metadata_in_comment() {
        let header = Mdf4Header::new(&Mdf4Metadata::default(), Utc::now());
        let xml = header.comment_xml();
        assert!(xml.starts_with("<HDcomment>"));
        assert!(xml.contains("<e name=\"author\">NMLP Edge Node</e>"));
        assert!(xml.contains("<TX>Synthetic Jerez telemetry"));

        let custom = header.with_description("Motor & ratings");
        assert!(custom.comment_xml().contains("<TX>Motor &amp; ratings</TX>"));
    }

    fn spec(name: &'static str, master: bool) -> ChannelSpec<'static> {
        ChannelSpec {
            name,
            unit: "",
            comment: "",
            master,
            limits: None,
        }
    }

    #[test]
    fn test_generic_group_round_trips() {
        use crate::mdf4::Mdf4File;

        let time = [0.0, 0.1, 0.2];
        let rpm = [800.0, 1_200.0, 1_900.0];
        let group = GroupData {
            acquisition: "motor",
            channels: vec![spec("time", true), spec("RPM", false)],
            columns: vec![&time[..], &rpm[..]],
        };
        let header = Mdf4Header::new(&Mdf4Metadata::default(), Utc::now());
        let file = Mdf4File::parse(&encode_groups(&[group], &header).unwrap()).unwrap();
        assert_eq!(file.channel_names("motor").unwrap(), vec!["time", "RPM"]);
        assert_eq!(file.channel_values("motor", "RPM").unwrap(), rpm);
        assert_eq!(file.group("motor").unwrap().master().unwrap().name, "time");
    }

    #[test]
    fn test_malformed_groups_rejected() {
        let header = Mdf4Header::new(&Mdf4Metadata::default(), Utc::now());
        let a = [1.0, 2.0];
        let b = [1.0];
        let ragged = GroupData {
            acquisition: "ragged",
            channels: vec![spec("a", true), spec("b", false)],
            columns: vec![&a[..], &b[..]],
        };
        let two_masters = GroupData {
            acquisition: "masters",
            channels: vec![spec("a", true), spec("b", true)],
            columns: vec![&a[..], &a[..]],
        };
        let empty = GroupData {
            acquisition: "empty",
            channels: Vec::new(),
            columns: Vec::new(),
        };
        for group in [ragged, two_masters, empty] {
            assert!(matches!(encode_groups(&[group], &header), Err(Error::Mdf4(_))));
        }
    }

    #[test]
    fn test_encoded_image_starts_with_id_block() {
        use crate::config::StudyConfig;
        use crate::telemetry::generate_dataset;

        let config = StudyConfig::builder().laps_per_setup(1).sample_rate_hz(10).build();
        let ds = generate_dataset(&config).unwrap();
        let header = Mdf4Header::new(&config.mdf4, Utc::now());
        let bytes = encode_mdf4(&ds, &header).unwrap();
        assert_eq!(&bytes[..8], b"MDF     ");
        assert_eq!(le_u16(&bytes, 28).unwrap(), 410);
        assert_eq!(&bytes[ID_BLOCK_SIZE..ID_BLOCK_SIZE + 4], b"##HD");
        assert_eq!(bytes.len() % 8, 0);
    }
}
