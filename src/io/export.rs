use anyhow::Result;
use std::io::Write;

use crate::domain::TransactionRecord;

/// Export records to CSV format. Returns the number of rows written.
pub fn export_records_csv<W: Write>(records: &[TransactionRecord], writer: W) -> Result<usize> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record(["sequence", "account_id", "delta", "description", "created_at"])?;

    for record in records {
        csv_writer.write_record(&[
            record.sequence.to_string(),
            record.account_id.to_string(),
            record.delta.to_string(),
            record.description.clone(),
            record.created_at.to_rfc3339(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(records.len())
}

/// Export records as a pretty-printed JSON array.
pub fn export_records_json<W: Write>(records: &[TransactionRecord], mut writer: W) -> Result<usize> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writeln!(writer)?;
    Ok(records.len())
}
