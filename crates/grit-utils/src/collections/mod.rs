mod prio_queue;

pub use prio_queue::PriorityQueue;
