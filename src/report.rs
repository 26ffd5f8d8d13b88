use std::io::{self, Write};

use crate::fixed_point::Tenths;
use crate::hash_table::{RunningStats, ShardTable};

/// Writes `name;min;mean;max` for one entity. Entities that were never
/// sighted write nothing.
pub fn write_line<W: Write>(stats: &RunningStats, out: &mut W) -> io::Result<()> {
    let Some(mean) = stats.mean() else {
        return Ok(());
    };

    out.write_all(stats.name())?;
    writeln!(
        out,
        ";{min};{mean};{max}",
        min = Tenths(stats.min as i64),
        mean = Tenths(mean),
        max = Tenths(stats.max as i64),
    )
}

/// Writes every entity of every shard, in table order.
pub fn write_report<W: Write>(tables: &[ShardTable], out: &mut W) -> io::Result<()> {
    for table in tables {
        for stats in table.entries() {
            write_line(stats, out)?;
        }
    }

    out.flush()
}
