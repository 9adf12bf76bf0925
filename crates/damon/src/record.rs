//! Recording matched regions to a binary trace, gated behind the
//! `record` feature — kept optional since not every caller wants the
//! `byteorder` dependency or the I/O overhead of writing a trace.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use damon_core::{CallbackOps, Context, Region, Target};
use log::warn;

/// A sink for per-region observations, called once per region at the end
/// of every aggregation.
pub trait RecordSink: Send {
    fn record_region(&mut self, target: &Target, region: &Region) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A fixed-width little-endian record per region:
/// `target_id: u64, start: u64, end: u64, nr_accesses: u32, age: u32`.
pub struct BinaryRecordWriter<W> {
    writer: W,
}

impl<W: Write + Send> BinaryRecordWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> RecordSink for BinaryRecordWriter<W> {
    fn record_region(&mut self, target: &Target, region: &Region) -> io::Result<()> {
        self.writer.write_u64::<LittleEndian>(target.id())?;
        self.writer.write_u64::<LittleEndian>(region.ar().start)?;
        self.writer.write_u64::<LittleEndian>(region.ar().end)?;
        self.writer.write_u32::<LittleEndian>(region.nr_accesses())?;
        self.writer.write_u32::<LittleEndian>(region.age())?;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Adapts a [`RecordSink`] into a [`CallbackOps`] so it can be installed
/// with [`Context::set_callbacks`](damon_core::Context::set_callbacks).
/// A write error is logged and treated as a request to stop the worker,
/// rather than silently dropping the rest of the trace.
pub struct RecordingCallbacks<S> {
    sink: S,
}

impl<S: RecordSink> RecordingCallbacks<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S: RecordSink> CallbackOps for RecordingCallbacks<S> {
    fn after_aggregation(&mut self, ctx: &Context) -> bool {
        for target in ctx.targets().iter() {
            for region in target.regions() {
                if let Err(e) = self.sink.record_region(target, region) {
                    warn!(target: "damon::record", "failed to write record: {e}");
                    return true;
                }
            }
        }
        if let Err(e) = self.sink.flush() {
            warn!(target: "damon::record", "failed to flush record sink: {e}");
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damon_core::NullPrimitive;

    #[test]
    fn writes_fixed_width_records_per_region() {
        let mut buf = Vec::new();
        {
            let mut writer = BinaryRecordWriter::new(&mut buf);
            let target = Target::new(7);
            let region = Region::new(0x1000, 0x3000);
            writer.record_region(&target, &region).unwrap();
        }
        assert_eq!(buf.len(), 8 + 8 + 8 + 4 + 4);
    }

    #[test]
    fn recording_callbacks_drains_every_target_and_region() {
        let mut buf = Vec::new();
        let ctx = Context::with_seed("rec", Box::new(NullPrimitive), 1);
        ctx.set_targets([1, 2]).unwrap();
        ctx.targets_mut()[0].add_region_tail(Region::new(0, 0x1000));
        ctx.targets_mut()[1].add_region_tail(Region::new(0, 0x1000));
        ctx.targets_mut()[1].add_region_tail(Region::new(0x1000, 0x2000));

        {
            let mut callbacks = RecordingCallbacks::new(BinaryRecordWriter::new(&mut buf));
            assert!(!callbacks.after_aggregation(&ctx));
        }
        assert_eq!(buf.len(), 3 * (8 + 8 + 8 + 4 + 4));
    }
}
