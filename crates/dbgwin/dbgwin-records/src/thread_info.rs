#![forbid(unsafe_code)]

// Thread-info payload, packed with no padding:
//
//   load: u8, thread_count: u8,
//   thread_count * { stack_usage: u8, cpu_load: u8, name_len: u8, name[name_len] }
//
// The producer rounds the record up to whole words, so trailing bytes after
// the last thread are expected and ignored.

const CPU_INFO_SIZE: usize = 2;
const THREAD_INFO_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("payload of {len} bytes ends before the cpu info header")]
    CpuHeader { len: usize },

    #[error("payload ends inside thread {index} header")]
    ThreadHeader { index: usize },

    #[error("payload ends inside thread {index} name ({name_len} bytes declared)")]
    ThreadName { index: usize, name_len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub name: String,
    /// Stack usage, U(0,8) fixed point.
    pub stack_usage: u8,
    /// Share of the core's cycles, U(0,8) fixed point.
    pub cpu_load: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuInfo {
    /// Core load, U(0,8) fixed point.
    pub load: u8,
    pub threads: Vec<ThreadInfo>,
}

/// Converts a U(0,8) fixed point fraction into percent.
#[inline]
pub fn fixed_point_percent(value: u8) -> f32 {
    value as f32 / 2.55
}

impl CpuInfo {
    /// Parses a thread-info payload (the bytes after the record header).
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        let (head, mut rest) = payload
            .split_at_checked(CPU_INFO_SIZE)
            .ok_or(ParseError::CpuHeader { len: payload.len() })?;
        let load = head[0];
        let thread_count = head[1] as usize;

        let mut threads = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let (th, after) = rest
                .split_at_checked(THREAD_INFO_SIZE)
                .ok_or(ParseError::ThreadHeader { index })?;
            let name_len = th[2] as usize;
            let (name, after) = after
                .split_at_checked(name_len)
                .ok_or(ParseError::ThreadName { index, name_len })?;
            threads.push(ThreadInfo {
                name: String::from_utf8_lossy(name).into_owned(),
                stack_usage: th[0],
                cpu_load: th[1],
            });
            rest = after;
        }

        Ok(Self { load, threads })
    }

    /// Serializes into the payload layout, without word padding.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = vec![self.load, self.threads.len() as u8];
        for t in &self.threads {
            let name = &t.name.as_bytes()[..t.name.len().min(u8::MAX as usize)];
            out.extend_from_slice(&[t.stack_usage, t.cpu_load, name.len() as u8]);
            out.extend_from_slice(name);
        }
        out
    }
}
