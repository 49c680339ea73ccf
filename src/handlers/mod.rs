pub mod ocr_handler;
