use std::collections::VecDeque;
use std::sync::Mutex;

/// Pool of reusable RGBA byte buffers for canvas-sized layer images
pub struct BufferPool {
    u8_buffers: Mutex<VecDeque<Vec<u8>>>,
    max_pool_size: usize,
}

impl BufferPool {
    /// Create a new buffer pool with specified maximum pool size
    pub fn new(max_pool_size: usize) -> Self {
        Self {
            u8_buffers: Mutex::new(VecDeque::with_capacity(max_pool_size)),
            max_pool_size,
        }
    }

    /// Get an empty Vec<u8> with at least the specified capacity
    pub fn get_u8_buffer(&self, min_capacity: usize) -> Vec<u8> {
        if let Ok(mut pool) = self.u8_buffers.lock() {
            if let Some(position) = pool.iter().position(|b| b.capacity() >= min_capacity) {
                if let Some(mut buffer) = pool.remove(position) {
                    buffer.clear();
                    return buffer;
                }
            }
        }

        Vec::with_capacity(min_capacity)
    }

    /// Return a buffer to the pool for reuse
    pub fn return_u8_buffer(&self, buffer: Vec<u8>) {
        if let Ok(mut pool) = self.u8_buffers.lock() {
            if pool.len() < self.max_pool_size && buffer.capacity() > 0 {
                pool.push_back(buffer);
            }
            // If pool is full or buffer has no capacity, just drop it
        }
    }

    /// Get pool statistics for debugging
    pub fn stats(&self) -> BufferPoolStats {
        let u8_count = self.u8_buffers.lock().map(|pool| pool.len()).unwrap_or(0);

        BufferPoolStats {
            u8_buffers_available: u8_count,
            max_pool_size: self.max_pool_size,
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(4)
    }
}

#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    pub u8_buffers_available: usize,
    pub max_pool_size: usize,
}
