mod classification_retry;

pub use classification_retry::ClassificationRetryWorker;
