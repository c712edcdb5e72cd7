use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::trace::{TraceExtension, TraceHeader};

/// One line of key header words per trace read, space separated.
pub struct HeaderListing<W: Write> {
    out: W,
}

impl HeaderListing<BufWriter<File>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        HeaderListing::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> HeaderListing<W> {
    pub const TITLE: &'static str = "field record, trace in field record, energy source point, cdp, \
horizontal stack, offset, source x, source y, group x, group y, midpoint station, \
source station, receiver station, line, shot point";

    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "{}", Self::TITLE)?;
        Ok(Self { out })
    }

    pub fn record(&mut self, raw: &[u8]) -> io::Result<()> {
        let hd  = TraceHeader::decode(raw);
        let ext = TraceExtension::decode(raw);
        writeln!(
            self.out,
            "{} {} {} {} {} {} {} {} {} {} {} {} {} {} {}",
            hd.field_record,
            hd.trace_in_field,
            hd.energy_source_point,
            hd.cdp_ensemble,
            hd.horizontal_stack,
            hd.offset_distance,
            hd.source_x,
            hd.source_y,
            hd.group_x,
            hd.group_y,
            ext.midpoint_station,
            ext.source_station,
            ext.receiver_station,
            ext.line,
            ext.shot_point,
        )
    }

    pub fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
