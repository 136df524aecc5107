use std::{ops::Range, sync::Arc, time::Instant};

use anyhow::Context;
use pdfium_render::prelude::{PdfPage, Pdfium};
use plsfix::fix_text;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{instrument, Span};

use crate::entities::{PageID, PageText};

const MAX_CONCURRENT_NATIVE_REQS: usize = 10;

/// Splits pdfium's page text into lines, repairing encoding damage on the way.
pub(crate) fn split_text_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| fix_text(line.trim_end_matches('\r'), None))
        .collect()
}

pub struct ExtractTextRequest {
    pub doc_data: Arc<[u8]>,
    pub password: Option<String>,
    pub page_range: Option<Range<usize>>,
    pub sender_tx: Sender<anyhow::Result<ExtractTextResponse>>,
    pub count_only: bool,
}

impl ExtractTextRequest {
    pub fn new(
        data: &[u8],
        password: Option<&str>,
        page_range: Option<Range<usize>>,
        sender_tx: Sender<anyhow::Result<ExtractTextResponse>>,
    ) -> Self {
        ExtractTextRequest {
            doc_data: Arc::from(data),
            password: password.map(|p| p.to_string()),
            page_range,
            sender_tx,
            count_only: false,
        }
    }

    pub fn new_count_only(
        data: &[u8],
        password: Option<&str>,
        sender_tx: Sender<anyhow::Result<ExtractTextResponse>>,
    ) -> Self {
        ExtractTextRequest {
            doc_data: Arc::from(data),
            password: password.map(|p| p.to_string()),
            page_range: None,
            sender_tx,
            count_only: true,
        }
    }
}

#[derive(Debug)]
pub struct ExtractTextMetadata {
    pub extract_duration_ms: u128,
}

#[derive(Debug)]
pub enum ExtractTextResponse {
    Page {
        page: PageText,
        metadata: ExtractTextMetadata,
    },
    PageCount(usize),
}

/// Handle to the pdfium worker. Pdfium runs on a single blocking thread; the
/// queue is cheap to clone and shared by every caller.
#[derive(Debug, Clone)]
pub struct ExtractTextQueue {
    queue: Sender<(ExtractTextRequest, Span)>,
}

impl Default for ExtractTextQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractTextQueue {
    /// Must be called from within a tokio runtime.
    pub fn new() -> Self {
        let (queue_sender, queue_receiver) = mpsc::channel(MAX_CONCURRENT_NATIVE_REQS);

        tokio::task::spawn_blocking(move || start_text_extractor(queue_receiver));
        Self {
            queue: queue_sender,
        }
    }

    pub(crate) async fn push(&self, req: ExtractTextRequest) -> anyhow::Result<()> {
        let span = Span::current();
        self.queue
            .send((req, span))
            .await
            .context("error sending extract text request")
    }
}

#[instrument(skip(page))]
pub(crate) fn extract_page_text(page_id: PageID, page: &PdfPage) -> anyhow::Result<PageText> {
    let text = page.text().context("can't load page text")?.all();
    Ok(PageText {
        page_id,
        lines: split_text_lines(&text),
    })
}

fn handle_extract_text_req(
    pdfium: &Pdfium,
    req: ExtractTextRequest,
    parent_span: Span,
) -> anyhow::Result<()> {
    let _guard = parent_span.enter();
    let ExtractTextRequest {
        doc_data,
        password,
        page_range,
        sender_tx,
        count_only,
    } = req;
    let document = pdfium
        .load_pdf_from_byte_slice(&doc_data, password.as_deref())
        .context("can't open pdf document")?;
    let page_count = document.pages().len() as usize;

    if count_only {
        sender_tx.blocking_send(Ok(ExtractTextResponse::PageCount(page_count)))?;
        return Ok(());
    }

    let range = match page_range {
        Some(range) => {
            if range.end > page_count {
                anyhow::bail!(
                    "Page range end ({}) exceeds document length ({})",
                    range.end,
                    page_count
                )
            }
            range
        }
        None => 0..page_count,
    };

    for (page_id, page) in document.pages().iter().enumerate() {
        if !range.contains(&page_id) {
            continue;
        }
        let start_time = Instant::now();
        match extract_page_text(page_id, &page) {
            Ok(page) => {
                let extract_duration_ms = start_time.elapsed().as_millis();
                tracing::debug!(
                    "Extracting text of page {} using pdfium took {}ms",
                    page_id,
                    extract_duration_ms
                );
                sender_tx.blocking_send(Ok(ExtractTextResponse::Page {
                    page,
                    metadata: ExtractTextMetadata {
                        extract_duration_ms,
                    },
                }))?
            }
            Err(e) => tracing::error!("error extracting text of page {page_id}: {e:?}"),
        }
    }
    Ok(())
}

fn bind_pdfium() -> anyhow::Result<Pdfium> {
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .context("can't load pdfium bindings")?;
    Ok(Pdfium::new(bindings))
}

pub fn start_text_extractor(mut input_rx: Receiver<(ExtractTextRequest, Span)>) {
    let pdfium = match bind_pdfium() {
        Ok(pdfium) => Some(pdfium),
        Err(e) => {
            tracing::error!("{e:?}");
            None
        }
    };
    while let Some((req, parent_span)) = input_rx.blocking_recv() {
        let sender_tx = req.sender_tx.clone();
        let result = match &pdfium {
            Some(pdfium) => handle_extract_text_req(pdfium, req, parent_span),
            None => Err(anyhow::anyhow!("pdfium library is not available")),
        };
        if let Err(e) = result {
            tracing::error!("error extracting document text: {e:?}");
            // The caller may already be gone.
            let _ = sender_tx.blocking_send(Err(e));
        }
    }
}
