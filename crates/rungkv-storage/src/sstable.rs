//! SSTable - Immutable sorted tables, encoded per table format
//!
//! SSTables are immutable on-disk files that store key-value pairs in sorted
//! order. The encoding of a new table is chosen by the writer from the
//! database's table-format bound; once written a table keeps its format
//! forever, so the reader understands every [`TableFormat`].
//!
//! ## File Format
//!
//! ```text
//! +------------------+
//! | Data Blocks      |  <- length-prefixed entries, CRC32 per block
//! +------------------+
//! | Index Block      |  <- first key (+ last key from V2) per block
//! +------------------+
//! | Footer           |  <- format tag, index location, properties (V2+),
//! |                  |     index CRC (V3+), magic, footer CRC
//! +------------------+
//! | Footer length    |  <- u32 LE
//! +------------------+
//! ```

use crate::memtable::MemtableEntry;
use rungkv_core::format_version::magic;
use rungkv_core::{Error, Result, TableFormat};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Directory holding SSTables, relative to the database directory
pub const SST_DIR: &str = "sst";

/// Target size of a data block before it is cut
const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Entry type tags
const ENTRY_TYPE_VALUE: u8 = 0;
const ENTRY_TYPE_TOMBSTONE: u8 = 1;
const ENTRY_TYPE_SET_WITH_DELETE: u8 = 2;

/// One key and what was written to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SSTableEntry {
    /// The key
    pub key: Vec<u8>,
    /// Entry type: 0 = value, 1 = tombstone, 2 = set-with-delete
    pub entry_type: u8,
    /// Written value; empty for tombstones
    pub value: Vec<u8>,
}

impl SSTableEntry {
    /// Create a value entry
    pub fn value(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            entry_type: ENTRY_TYPE_VALUE,
            value,
        }
    }

    /// Create a set-with-delete entry
    pub fn set_with_delete(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self {
            key,
            entry_type: ENTRY_TYPE_SET_WITH_DELETE,
            value,
        }
    }

    /// Deletion marker for `key`
    pub fn tombstone(key: Vec<u8>) -> Self {
        Self {
            key,
            entry_type: ENTRY_TYPE_TOMBSTONE,
            value: Vec::new(),
        }
    }

    /// Whether this entry deletes its key
    pub fn is_tombstone(&self) -> bool {
        self.entry_type == ENTRY_TYPE_TOMBSTONE
    }

    /// Check if this is a set-with-delete
    pub fn is_set_with_delete(&self) -> bool {
        self.entry_type == ENTRY_TYPE_SET_WITH_DELETE
    }

    /// Convert a memtable entry for flushing
    pub fn from_memtable(key: Vec<u8>, entry: MemtableEntry) -> Self {
        match entry {
            MemtableEntry::Value(v) => Self::value(key, v),
            MemtableEntry::SetWithDelete(v) => Self::set_with_delete(key, v),
            MemtableEntry::Tombstone => Self::tombstone(key),
        }
    }
}

/// Location and key bounds of one data block
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    first_key: Vec<u8>,
    /// Block property: last key in the block (V2+)
    last_key: Option<Vec<u8>>,
    offset: u64,
    /// Size of the block including its CRC
    size: u32,
}

/// Table properties, collected while writing (V2+)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableProperties {
    /// Number of entries of any kind
    pub num_entries: u64,
    /// Number of tombstones
    pub num_deletions: u64,
    /// Number of set-with-delete entries
    pub num_set_with_deletes: u64,
    /// Sum of key lengths
    pub raw_key_size: u64,
    /// Sum of value lengths
    pub raw_value_size: u64,
}

/// SSTable footer
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SSTableFooter {
    table_format: u32,
    index_offset: u64,
    index_size: u32,
    /// CRC32 of the encoded index (V3+, zero otherwise)
    index_crc: u32,
    properties: Option<TableProperties>,
    entry_count: u64,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    magic: u64,
    /// CRC32 of the footer encoded with this field set to zero
    crc: u32,
}

impl SSTableFooter {
    fn checksum(&self) -> Result<u32> {
        let unsealed = SSTableFooter {
            crc: 0,
            ..self.clone()
        };
        let encoded =
            bincode::serialize(&unsealed).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(crc32fast::hash(&encoded))
    }
}

/// Description of a finished table
#[derive(Debug, Clone)]
pub struct SSTableMeta {
    /// Path to the SSTable file
    pub path: PathBuf,
    /// Minimum key
    pub min_key: Vec<u8>,
    /// Maximum key
    pub max_key: Vec<u8>,
    /// Number of entries
    pub entry_count: u64,
    /// File size in bytes
    pub file_size: u64,
    /// Encoding of the table
    pub table_format: TableFormat,
}

/// Builds a table from entries added in strictly increasing key order
pub struct SSTableWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    table_format: TableFormat,
    position: u64,
    index: Vec<IndexEntry>,
    block_buffer: Vec<u8>,
    block_size: usize,
    block_first_key: Option<Vec<u8>>,
    block_last_key: Option<Vec<u8>>,
    properties: TableProperties,
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
}

impl SSTableWriter {
    /// Create a new SSTable writer producing `table_format`
    pub fn new(path: impl AsRef<Path>, table_format: TableFormat) -> Result<Self> {
        Self::with_block_size(path, table_format, DEFAULT_BLOCK_SIZE)
    }

    /// Writer with a non-default data block size
    pub fn with_block_size(
        path: impl AsRef<Path>,
        table_format: TableFormat,
        block_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            table_format,
            position: 0,
            index: Vec::new(),
            block_buffer: Vec::with_capacity(block_size),
            block_size,
            block_first_key: None,
            block_last_key: None,
            properties: TableProperties::default(),
            min_key: None,
            max_key: None,
        })
    }

    /// Add an entry. Keys must be added in strictly increasing order.
    pub fn add(&mut self, entry: SSTableEntry) -> Result<()> {
        if let Some(max) = &self.max_key {
            if entry.key.as_slice() <= max.as_slice() {
                return Err(Error::InvalidOperation(format!(
                    "SSTable keys out of order: {:?} after {:?}",
                    entry.key, max
                )));
            }
        }

        if self.min_key.is_none() {
            self.min_key = Some(entry.key.clone());
        }
        self.max_key = Some(entry.key.clone());
        if self.block_first_key.is_none() {
            self.block_first_key = Some(entry.key.clone());
        }
        self.block_last_key = Some(entry.key.clone());

        self.properties.num_entries += 1;
        self.properties.raw_key_size += entry.key.len() as u64;
        self.properties.raw_value_size += entry.value.len() as u64;
        if entry.is_tombstone() {
            self.properties.num_deletions += 1;
        } else if entry.is_set_with_delete() {
            self.properties.num_set_with_deletes += 1;
        }

        let encoded =
            bincode::serialize(&entry).map_err(|e| Error::Serialization(e.to_string()))?;
        self.block_buffer
            .extend_from_slice(&(encoded.len() as u32).to_le_bytes());
        self.block_buffer.extend_from_slice(&encoded);

        if self.block_buffer.len() >= self.block_size {
            self.flush_block()?;
        }

        Ok(())
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.properties.num_entries
    }

    /// Approximate bytes written so far, including the pending block
    pub fn estimated_size(&self) -> u64 {
        self.position + self.block_buffer.len() as u64
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_buffer.is_empty() {
            return Ok(());
        }

        let crc = crc32fast::hash(&self.block_buffer);
        let last_key = self.block_last_key.take();
        if let Some(first_key) = self.block_first_key.take() {
            self.index.push(IndexEntry {
                first_key,
                last_key: if self.table_format.has_properties() {
                    last_key
                } else {
                    None
                },
                offset: self.position,
                size: self.block_buffer.len() as u32 + 4,
            });
        }

        self.writer.write_all(&self.block_buffer)?;
        self.writer.write_all(&crc.to_le_bytes())?;
        self.position += self.block_buffer.len() as u64 + 4;
        self.block_buffer.clear();

        Ok(())
    }

    /// Finish writing, fsync, and return the table's metadata
    pub fn finish(mut self) -> Result<SSTableMeta> {
        self.flush_block()?;

        let index_offset = self.position;
        let index_encoded =
            bincode::serialize(&self.index).map_err(|e| Error::Serialization(e.to_string()))?;
        let index_size = index_encoded.len() as u32;
        self.writer.write_all(&index_encoded)?;
        self.position += index_size as u64;

        let min_key = self.min_key.take().unwrap_or_default();
        let max_key = self.max_key.take().unwrap_or_default();
        let mut footer = SSTableFooter {
            table_format: self.table_format.as_u32(),
            index_offset,
            index_size,
            index_crc: if self.table_format.has_index_checksum() {
                crc32fast::hash(&index_encoded)
            } else {
                0
            },
            properties: if self.table_format.has_properties() {
                Some(self.properties.clone())
            } else {
                None
            },
            entry_count: self.properties.num_entries,
            min_key: min_key.clone(),
            max_key: max_key.clone(),
            magic: magic::SSTABLE,
            crc: 0,
        };
        footer.crc = footer.checksum()?;

        let footer_encoded =
            bincode::serialize(&footer).map_err(|e| Error::Serialization(e.to_string()))?;
        self.writer.write_all(&footer_encoded)?;
        self.writer
            .write_all(&(footer_encoded.len() as u32).to_le_bytes())?;
        self.position += footer_encoded.len() as u64 + 4;

        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;

        Ok(SSTableMeta {
            path: self.path,
            min_key,
            max_key,
            entry_count: self.properties.num_entries,
            file_size: self.position,
            table_format: self.table_format,
        })
    }

    /// Build an SSTable from sorted memtable entries
    pub fn from_memtable<I>(
        path: impl AsRef<Path>,
        table_format: TableFormat,
        iter: I,
    ) -> Result<SSTableMeta>
    where
        I: Iterator<Item = (Vec<u8>, MemtableEntry)>,
    {
        let mut writer = SSTableWriter::new(path, table_format)?;
        for (key, entry) in iter {
            writer.add(SSTableEntry::from_memtable(key, entry))?;
        }
        writer.finish()
    }
}

/// Point lookups and iteration over one table file
pub struct SSTableReader {
    path: PathBuf,
    file: BufReader<File>,
    table_format: TableFormat,
    index: Vec<IndexEntry>,
    footer: SSTableFooter,
    file_size: u64,
}

impl SSTableReader {
    /// Open a table, validating its footer and index
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        if file_size < 4 {
            return Err(Error::Corruption(format!(
                "SSTable {} too small",
                path.display()
            )));
        }

        file.seek(SeekFrom::End(-4))?;
        let mut footer_len_buf = [0u8; 4];
        file.read_exact(&mut footer_len_buf)?;
        let footer_len = u32::from_le_bytes(footer_len_buf) as u64;
        if footer_len + 4 > file_size {
            return Err(Error::Corruption(format!(
                "SSTable {} footer length {} exceeds file size",
                path.display(),
                footer_len
            )));
        }

        file.seek(SeekFrom::End(-4 - footer_len as i64))?;
        let mut footer_buf = vec![0u8; footer_len as usize];
        file.read_exact(&mut footer_buf)?;
        let footer: SSTableFooter =
            bincode::deserialize(&footer_buf).map_err(|e| Error::Serialization(e.to_string()))?;

        if footer.magic != magic::SSTABLE {
            return Err(Error::Corruption(format!(
                "SSTable {} has invalid magic number",
                path.display()
            )));
        }
        if footer.checksum()? != footer.crc {
            return Err(Error::Corruption(format!(
                "SSTable {} footer CRC mismatch",
                path.display()
            )));
        }
        let table_format = TableFormat::from_u32(footer.table_format).ok_or_else(|| {
            Error::Corruption(format!(
                "SSTable {} uses unknown table format {}",
                path.display(),
                footer.table_format
            ))
        })?;

        file.seek(SeekFrom::Start(footer.index_offset))?;
        let mut index_buf = vec![0u8; footer.index_size as usize];
        file.read_exact(&mut index_buf)?;
        if table_format.has_index_checksum() && crc32fast::hash(&index_buf) != footer.index_crc {
            return Err(Error::Corruption(format!(
                "SSTable {} index CRC mismatch",
                path.display()
            )));
        }
        let index: Vec<IndexEntry> =
            bincode::deserialize(&index_buf).map_err(|e| Error::Serialization(e.to_string()))?;

        Ok(Self {
            path,
            file: BufReader::new(file),
            table_format,
            index,
            footer,
            file_size,
        })
    }

    /// Get an entry by key
    pub fn get(&mut self, key: &[u8]) -> Result<Option<SSTableEntry>> {
        if !self.might_contain(key) {
            return Ok(None);
        }

        // Last block whose first key is <= key
        let block_idx = self
            .index
            .partition_point(|entry| entry.first_key.as_slice() <= key);
        if block_idx == 0 {
            return Ok(None);
        }
        let block_idx = block_idx - 1;

        // The block property lets us skip the read when the key falls in a
        // gap between blocks.
        if let Some(last_key) = &self.index[block_idx].last_key {
            if key > last_key.as_slice() {
                return Ok(None);
            }
        }

        let block = self.read_block(block_idx)?;
        Ok(block.into_iter().find(|entry| entry.key.as_slice() == key))
    }

    fn read_block(&mut self, block_idx: usize) -> Result<Vec<SSTableEntry>> {
        let index_entry = &self.index[block_idx];
        let end = index_entry.offset.checked_add(index_entry.size as u64);
        let data_size = match (index_entry.size.checked_sub(4), end) {
            (Some(data_size), Some(end)) if end <= self.footer.index_offset => data_size as usize,
            _ => {
                return Err(Error::Corruption(format!(
                    "SSTable {} block {} has invalid extent offset={} size={}",
                    self.path.display(),
                    block_idx,
                    index_entry.offset,
                    index_entry.size
                )))
            }
        };
        self.file.seek(SeekFrom::Start(index_entry.offset))?;

        let mut data_buf = vec![0u8; data_size];
        self.file.read_exact(&mut data_buf)?;

        let mut crc_buf = [0u8; 4];
        self.file.read_exact(&mut crc_buf)?;
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&data_buf) {
            return Err(Error::Corruption(format!(
                "SSTable {} block {} CRC mismatch",
                self.path.display(),
                block_idx
            )));
        }

        let mut entries = Vec::new();
        let mut offset = 0;
        while offset + 4 <= data_buf.len() {
            let len = u32::from_le_bytes([
                data_buf[offset],
                data_buf[offset + 1],
                data_buf[offset + 2],
                data_buf[offset + 3],
            ]) as usize;
            offset += 4;
            if offset + len > data_buf.len() {
                return Err(Error::Corruption(format!(
                    "SSTable {} block {} truncated entry",
                    self.path.display(),
                    block_idx
                )));
            }
            let entry: SSTableEntry = bincode::deserialize(&data_buf[offset..offset + len])
                .map_err(|e| Error::Serialization(e.to_string()))?;
            entries.push(entry);
            offset += len;
        }

        Ok(entries)
    }

    /// Encoding of this table
    pub fn table_format(&self) -> TableFormat {
        self.table_format
    }

    /// Table properties, present from [`TableFormat::V2`]
    pub fn properties(&self) -> Option<&TableProperties> {
        self.footer.properties.as_ref()
    }

    /// Summary of this table as recorded in its footer
    pub fn metadata(&self) -> SSTableMeta {
        SSTableMeta {
            path: self.path.clone(),
            min_key: self.footer.min_key.clone(),
            max_key: self.footer.max_key.clone(),
            entry_count: self.footer.entry_count,
            file_size: self.file_size,
            table_format: self.table_format,
        }
    }

    /// Whether `key` falls within this table's key range
    pub fn might_contain(&self, key: &[u8]) -> bool {
        self.footer.entry_count > 0
            && key >= self.footer.min_key.as_slice()
            && key <= self.footer.max_key.as_slice()
    }

    /// Entries in key order, block by block
    pub fn iter(&mut self) -> SSTableIterator<'_> {
        SSTableIterator {
            reader: self,
            block_idx: 0,
            block_entries: Vec::new().into_iter(),
        }
    }
}

/// Sequential reader over a table's entries
pub struct SSTableIterator<'a> {
    reader: &'a mut SSTableReader,
    block_idx: usize,
    block_entries: std::vec::IntoIter<SSTableEntry>,
}

impl SSTableIterator<'_> {
    /// Get the next entry
    pub fn next_entry(&mut self) -> Result<Option<SSTableEntry>> {
        loop {
            if let Some(entry) = self.block_entries.next() {
                return Ok(Some(entry));
            }
            if self.block_idx >= self.reader.index.len() {
                return Ok(None);
            }
            self.block_entries = self.reader.read_block(self.block_idx)?.into_iter();
            self.block_idx += 1;
        }
    }
}

/// Path of the SSTable numbered `file_num` in database directory `dir`
pub fn table_path(dir: &Path, file_num: u64) -> PathBuf {
    dir.join(SST_DIR).join(format!("{:06}.sst", file_num))
}

/// Parses a table file name produced by [`table_path`]
pub fn parse_table_file_name(name: &str) -> Option<u64> {
    name.strip_suffix(".sst")?.parse().ok()
}

/// Remove a table file from disk
pub fn delete_sstable(path: impl AsRef<Path>) -> Result<()> {
    fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_abc(path: &Path, format: TableFormat) -> SSTableMeta {
        let mut writer = SSTableWriter::new(path, format).unwrap();
        writer.add(SSTableEntry::value(b"a".to_vec(), b"1".to_vec())).unwrap();
        writer.add(SSTableEntry::tombstone(b"b".to_vec())).unwrap();
        writer
            .add(SSTableEntry::set_with_delete(b"c".to_vec(), b"3".to_vec()))
            .unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_sstable_write_read_every_format() {
        let dir = tempdir().unwrap();
        for format in [TableFormat::V1, TableFormat::V2, TableFormat::V3] {
            let path = dir.path().join(format!("{}.sst", format));
            let meta = write_abc(&path, format);
            assert_eq!(meta.entry_count, 3);
            assert_eq!(meta.table_format, format);
            assert_eq!(meta.file_size, fs::metadata(&path).unwrap().len());

            let mut reader = SSTableReader::open(&path).unwrap();
            assert_eq!(reader.table_format(), format);
            assert_eq!(reader.get(b"a").unwrap().unwrap().value, b"1".to_vec());
            assert!(reader.get(b"b").unwrap().unwrap().is_tombstone());
            assert!(reader.get(b"c").unwrap().unwrap().is_set_with_delete());
            assert!(reader.get(b"d").unwrap().is_none());
        }
    }

    #[test]
    fn test_properties_only_from_v2() {
        let dir = tempdir().unwrap();

        let v1 = dir.path().join("v1.sst");
        write_abc(&v1, TableFormat::V1);
        assert!(SSTableReader::open(&v1).unwrap().properties().is_none());

        let v2 = dir.path().join("v2.sst");
        write_abc(&v2, TableFormat::V2);
        let reader = SSTableReader::open(&v2).unwrap();
        let props = reader.properties().unwrap();
        assert_eq!(props.num_entries, 3);
        assert_eq!(props.num_deletions, 1);
        assert_eq!(props.num_set_with_deletes, 1);
        assert_eq!(props.raw_key_size, 3);
        assert_eq!(props.raw_value_size, 2);
    }

    #[test]
    fn test_v3_detects_index_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("v3.sst");
        let mut writer = SSTableWriter::with_block_size(&path, TableFormat::V3, 16).unwrap();
        for i in 0..20 {
            let key = format!("key{:03}", i);
            writer.add(SSTableEntry::value(key.into_bytes(), b"v".to_vec())).unwrap();
        }
        writer.finish().unwrap();

        // Locate the index from an intact reader, then flip a byte inside it.
        let index_offset = {
            let reader = SSTableReader::open(&path).unwrap();
            reader.footer.index_offset
        };
        let mut bytes = fs::read(&path).unwrap();
        bytes[index_offset as usize + 9] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let err = SSTableReader::open(&path).err().unwrap();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_invalid_block_extent_is_corruption() {
        let dir = tempdir().unwrap();
        for format in [TableFormat::V1, TableFormat::V2] {
            let path = dir.path().join(format!("{}.sst", format));
            write_abc(&path, format);

            // Neither format checksums its index, so a damaged entry reaches
            // the block read.
            let mut reader = SSTableReader::open(&path).unwrap();
            reader.index[0].size = 2;
            assert!(reader.get(b"a").unwrap_err().is_corruption());

            let mut reader = SSTableReader::open(&path).unwrap();
            reader.index[0].size = u32::MAX;
            assert!(reader.get(b"a").unwrap_err().is_corruption());

            let mut reader = SSTableReader::open(&path).unwrap();
            reader.index[0].offset = u64::MAX;
            let mut iter = reader.iter();
            assert!(iter.next_entry().unwrap_err().is_corruption());
        }
    }

    #[test]
    fn test_keys_must_increase() {
        let dir = tempdir().unwrap();
        let mut writer = SSTableWriter::new(dir.path().join("t.sst"), TableFormat::V1).unwrap();
        writer.add(SSTableEntry::value(b"b".to_vec(), b"2".to_vec())).unwrap();
        assert!(writer
            .add(SSTableEntry::value(b"a".to_vec(), b"1".to_vec()))
            .is_err());
        assert!(writer
            .add(SSTableEntry::value(b"b".to_vec(), b"1".to_vec()))
            .is_err());
    }

    #[test]
    fn test_sstable_iterator_multi_block() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut writer = SSTableWriter::with_block_size(&path, TableFormat::V2, 64).unwrap();
        for i in 0..100 {
            let key = format!("key{:03}", i);
            let value = format!("value{}", i);
            writer
                .add(SSTableEntry::value(key.into_bytes(), value.into_bytes()))
                .unwrap();
        }
        writer.finish().unwrap();

        let mut reader = SSTableReader::open(&path).unwrap();
        assert!(reader.index.len() > 1);
        assert_eq!(reader.get(b"key057").unwrap().unwrap().value, b"value57".to_vec());
        assert!(reader.get(b"key057x").unwrap().is_none());

        let mut iter = reader.iter();
        let mut count = 0;
        while let Some(_entry) = iter.next_entry().unwrap() {
            count += 1;
        }
        assert_eq!(count, 100);
    }

    #[test]
    fn test_sstable_from_memtable() {
        use crate::memtable::Memtable;

        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut mt = Memtable::new();
        mt.put(b"a".to_vec(), b"1".to_vec(), false);
        mt.put(b"b".to_vec(), b"2".to_vec(), false);
        mt.delete(b"c".to_vec());

        let meta = SSTableWriter::from_memtable(&path, TableFormat::V1, mt.drain()).unwrap();
        assert_eq!(meta.entry_count, 3);

        let mut reader = SSTableReader::open(&path).unwrap();
        assert_eq!(reader.get(b"a").unwrap().unwrap().value, b"1".to_vec());
        assert!(reader.get(b"c").unwrap().unwrap().is_tombstone());
    }

    #[test]
    fn test_table_file_names() {
        let path = table_path(Path::new("/db"), 42);
        assert_eq!(path, Path::new("/db/sst/000042.sst"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(parse_table_file_name(name), Some(42));
        assert_eq!(parse_table_file_name("MANIFEST"), None);
        assert_eq!(parse_table_file_name("x.sst"), None);
    }

    #[test]
    fn test_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.sst");
        let meta = SSTableWriter::new(&path, TableFormat::V2)
            .unwrap()
            .finish()
            .unwrap();
        assert_eq!(meta.entry_count, 0);

        let mut reader = SSTableReader::open(&path).unwrap();
        assert!(reader.get(b"").unwrap().is_none());
        assert!(reader.iter().next_entry().unwrap().is_none());
    }
}
