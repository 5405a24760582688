use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::{MarchiveClient, segment};
use crate::error::Error;
use crate::transport::{ApiRequest, Transport};
use crate::types::{BookHash, JobId, Pagination, Role, UserId, lenient};

#[cfg(feature = "admin")]
use crate::transport::FormField;
#[cfg(feature = "admin")]
use crate::types::MessageResponse;

pub const DEFAULT_SEARCH_LIMIT: u32 = 20;
pub const DEFAULT_BROWSE_LIMIT: u32 = 24;

/// Book metadata as listed by search, explore and favorites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Book {
    pub hash: BookHash,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: String,
    #[serde(default)]
    pub publisher: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub cover_url: String,
    #[serde(default)]
    pub cover_data: String,
    /// `"available"` when the file is already in the library.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub download_count: Option<u64>,
    #[serde(default)]
    pub is_ghost: Option<bool>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub requested_by: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Book {
    #[must_use]
    pub fn new(hash: impl Into<BookHash>, title: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.status.as_deref() == Some("available")
    }
}

/// Which part of the catalogue a search covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    #[default]
    All,
    /// Books already in the library.
    Downloaded,
    /// Books not downloaded yet.
    Missing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SearchResponse {
    #[serde(default)]
    pub search_id: Option<String>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Paginated book listing (explore, favorites).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct BookList {
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct FavoriteToggle {
    pub is_favorited: bool,
    #[serde(default)]
    pub message: String,
}

/// Person who first requested a book (admin view of book details).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct Requester {
    #[serde(deserialize_with = "lenient::id")]
    pub id: UserId,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[non_exhaustive]
pub struct BookDetail {
    pub book: Book,
    #[serde(default)]
    pub requested_by: Option<Requester>,
}

/// Download job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Downloading,
    Processing,
    Completed,
    Failed,
    Error,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Whether the job will not change any more.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Error)
    }
}

/// A download job tracked on the client, with a mirror of the book metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct DownloadJob {
    #[serde(alias = "job_id", deserialize_with = "lenient::id")]
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub error_msg: Option<String>,
    pub book_hash: BookHash,
    /// Whether the finished file can be downloaded (status responses only).
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "lenient::option")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub cover_data: Option<String>,
}

impl DownloadJob {
    #[must_use]
    pub fn new(id: JobId, status: JobStatus, book_hash: BookHash) -> Self {
        Self {
            id,
            status,
            progress: 0,
            error_msg: None,
            book_hash,
            available: None,
            created_at: None,
            updated_at: None,
            title: None,
            authors: None,
            publisher: None,
            language: None,
            format: None,
            size: None,
            cover_url: None,
            cover_data: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: u32) -> Self {
        self.progress = progress;
        self
    }

    /// Copy the listing metadata of `book` onto this job.
    #[must_use]
    pub fn with_book(mut self, book: &Book) -> Self {
        self.title = Some(book.title.clone());
        self.authors = Some(book.authors.clone());
        self.publisher = Some(book.publisher.clone());
        self.language = Some(book.language.clone());
        self.format = Some(book.format.clone());
        self.size = Some(book.size.clone());
        self.cover_url = Some(book.cover_url.clone());
        self.cover_data = Some(book.cover_data.clone());
        self
    }

    /// Overwrite fields from a newer server view of the same job.
    ///
    /// Metadata the update does not carry is kept.
    pub fn apply(&mut self, update: DownloadJob) {
        self.status = update.status;
        self.progress = update.progress;
        self.error_msg = update.error_msg;
        self.book_hash = update.book_hash;
        macro_rules! overwrite_if_present {
            ($($field:ident),*) => {
                $(if update.$field.is_some() { self.$field = update.$field; })*
            };
        }
        overwrite_if_present!(
            available, created_at, updated_at, title, authors, publisher, language, format, size, cover_url,
            cover_data
        );
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[non_exhaustive]
pub struct DownloadList {
    #[serde(default)]
    pub jobs: Vec<DownloadJob>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Body of `POST /books/download`.
#[derive(Debug, Clone, Default, Serialize)]
#[non_exhaustive]
pub struct DownloadRequest {
    pub hash: BookHash,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ghost: Option<bool>,
}

impl DownloadRequest {
    #[must_use]
    pub fn new(hash: impl Into<BookHash>, title: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Request carrying every metadata field of a search result.
    #[must_use]
    pub fn for_book(book: &Book) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Self {
            hash: book.hash.clone(),
            title: book.title.clone(),
            authors: non_empty(&book.authors),
            publisher: non_empty(&book.publisher),
            language: non_empty(&book.language),
            format: non_empty(&book.format),
            size: non_empty(&book.size),
            cover_url: non_empty(&book.cover_url),
            cover_data: non_empty(&book.cover_data),
            is_ghost: book.is_ghost,
        }
    }

    #[must_use]
    pub fn ghost(mut self, is_ghost: bool) -> Self {
        self.is_ghost = Some(is_ghost);
        self
    }
}

#[derive(Deserialize)]
struct DownloadAccepted {
    #[serde(deserialize_with = "lenient::id")]
    job_id: JobId,
    status: JobStatus,
}

/// Bounded polling schedule for [`BooksApi::poll_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_polls: 150,
        }
    }
}

/// File content for multipart uploads.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

impl FileUpload {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: None,
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    #[cfg(feature = "admin")]
    fn into_field(self, name: &str) -> FormField {
        FormField::File {
            name: name.to_string(),
            file_name: self.file_name,
            mime: self.mime,
            bytes: self.bytes,
        }
    }
}

/// Book library endpoints.
pub struct BooksApi<'a, T> {
    client: &'a MarchiveClient<T>,
}

impl<'a, T: Transport> BooksApi<'a, T> {
    pub(crate) fn new(client: &'a MarchiveClient<T>) -> Self {
        Self { client }
    }

    /// Search the whole catalogue. The result replaces the search snapshot.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<SearchResponse, Error> {
        self.search_filtered(query, SearchType::All, limit, offset).await
    }

    /// Like [`search`](Self::search), restricted to downloaded or missing
    /// books.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn search_filtered(
        &self,
        query: &str,
        search_type: SearchType,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResponse, Error> {
        let request = search_request(query, search_type, limit, offset)?;
        let results: SearchResponse = self.client.send_json(request).await?;
        tracing::debug!(query, ?search_type, total = results.total, "Search completed");
        self.client.stores().set_search_results(results.clone());
        Ok(results)
    }

    /// Books already in the library, most popular first.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn explore(&self, limit: u32, offset: u32) -> Result<BookList, Error> {
        let request = ApiRequest::get("/books/explore")
            .query("limit", limit)
            .query("offset", offset);
        let list: BookList = self.client.send_json(request).await?;
        self.client.stores().set_explored(list.clone());
        Ok(list)
    }

    /// The signed-in user's favorites.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn favorites(&self, limit: u32, offset: u32) -> Result<BookList, Error> {
        let request = ApiRequest::get("/books/favorites")
            .query("limit", limit)
            .query("offset", offset);
        let list: BookList = self.client.send_json(request).await?;
        self.client.stores().set_favorites(list.clone());
        Ok(list)
    }

    /// Add or remove a favorite.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn toggle_favorite(&self, hash: &BookHash) -> Result<FavoriteToggle, Error> {
        let request = ApiRequest::post("/books/favorite")
            .json(&serde_json::json!({ "book_hash": hash }))?;
        self.client.send_json(request).await
    }

    /// Ask the server to fetch a book. The new job is tracked in the
    /// download-jobs store.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn request_download(&self, hash: &BookHash, title: &str) -> Result<DownloadJob, Error> {
        self.request_download_with(&DownloadRequest::new(hash.clone(), title))
            .await
    }

    /// [`request_download`](Self::request_download) with full metadata.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn request_download_with(&self, req: &DownloadRequest) -> Result<DownloadJob, Error> {
        let request = ApiRequest::post("/books/download").json(req)?;
        let accepted: DownloadAccepted = self.client.send_json(request).await?;

        let mut job = DownloadJob::new(accepted.job_id, accepted.status, req.hash.clone());
        job.title = Some(req.title.clone());
        job.authors.clone_from(&req.authors);
        job.publisher.clone_from(&req.publisher);
        job.language.clone_from(&req.language);
        job.format.clone_from(&req.format);
        job.size.clone_from(&req.size);
        job.cover_url.clone_from(&req.cover_url);
        job.cover_data.clone_from(&req.cover_data);

        tracing::info!(job_id = %job.id, hash = %job.book_hash, "Download requested");
        self.client.stores().upsert_job(job.clone());
        Ok(job)
    }

    /// Download a result from a cached search by its position.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn request_cached_download(
        &self,
        search_id: &str,
        index: usize,
        book: &Book,
    ) -> Result<DownloadJob, Error> {
        let request = ApiRequest::post("/books/download/cached")
            .json(&serde_json::json!({ "search_id": search_id, "index": index }))?;
        let accepted: DownloadAccepted = self.client.send_json(request).await?;

        let job = DownloadJob::new(accepted.job_id, accepted.status, book.hash.clone()).with_book(book);
        self.client.stores().upsert_job(job.clone());
        Ok(job)
    }

    /// Current state of a job. A tracked job is updated in place.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn job_status(&self, id: &JobId) -> Result<DownloadJob, Error> {
        let request = ApiRequest::get(format!("/books/job/{}", segment(&id.0)));
        let update: DownloadJob = self.client.send_json(request).await?;
        Ok(self.track(update))
    }

    /// Poll a job until it finishes or the policy runs out, returning the last
    /// state seen.
    ///
    /// # Errors
    ///
    /// The first [`Error`] from any poll.
    pub async fn poll_job(&self, id: &JobId, policy: PollPolicy) -> Result<DownloadJob, Error> {
        let mut job = self.job_status(id).await?;
        let mut polls = 1;
        while !job.status.is_terminal() && polls < policy.max_polls {
            tokio::time::sleep(policy.interval).await;
            job = self.job_status(id).await?;
            polls += 1;
        }
        if !job.status.is_terminal() {
            tracing::debug!(job_id = %id, polls, "Stopped polling unfinished job");
        }
        Ok(job)
    }

    /// The user's download history.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn downloads(&self, limit: u32, offset: u32) -> Result<DownloadList, Error> {
        let request = ApiRequest::get("/books/downloads")
            .query("limit", limit)
            .query("offset", offset);
        self.client.send_json(request).await
    }

    /// Book metadata and, for admins, who requested it.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn detail(&self, hash: &BookHash) -> Result<BookDetail, Error> {
        let request = ApiRequest::get(format!("/books/{}", segment(&hash.0)));
        self.client.send_json(request).await
    }

    /// Fetch the book file itself.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn download_file(&self, hash: &BookHash) -> Result<Bytes, Error> {
        let request = ApiRequest::get(format!("/books/{}/download", segment(&hash.0)));
        Ok(self.client.send(request).await?.body)
    }

    /// Direct link to the book file, for handing to a browser.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL cannot be built.
    pub fn download_url(&self, hash: &BookHash) -> Result<Url, Error> {
        ApiRequest::get(format!("/books/{}/download", segment(&hash.0)))
            .url(self.client.config().api_base())
    }

    fn track(&self, update: DownloadJob) -> DownloadJob {
        let stores = self.client.stores();
        match stores.job(&update.id) {
            Some(mut tracked) => {
                tracked.apply(update);
                stores.upsert_job(tracked.clone());
                tracked
            }
            None => update,
        }
    }
}

/// Result of re-importing book files already on the server's disk.
#[cfg(feature = "admin")]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[non_exhaustive]
pub struct RestoreReport {
    #[serde(default)]
    pub restored: u64,
    #[serde(default)]
    pub skipped: u64,
    #[serde(default)]
    pub errors: Option<Vec<String>>,
    #[serde(default)]
    pub message: String,
}

/// Metadata edit for an existing book.
#[cfg(feature = "admin")]
#[derive(Debug, Clone, Default, Serialize)]
#[non_exhaustive]
pub struct MetadataUpdate {
    pub title: String,
    pub authors: String,
    pub publisher: String,
}

#[cfg(feature = "admin")]
impl MetadataUpdate {
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        authors: impl Into<String>,
        publisher: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            authors: authors.into(),
            publisher: publisher.into(),
        }
    }
}

/// A book file uploaded by hand.
#[cfg(feature = "admin")]
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BookUpload {
    pub book: FileUpload,
    pub title: String,
    pub authors: Option<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub cover: Option<FileUpload>,
}

#[cfg(feature = "admin")]
impl BookUpload {
    #[must_use]
    pub fn new(book: FileUpload, title: impl Into<String>) -> Self {
        Self {
            book,
            title: title.into(),
            authors: None,
            publisher: None,
            language: None,
            cover: None,
        }
    }

    #[must_use]
    pub fn with_authors(mut self, authors: impl Into<String>) -> Self {
        self.authors = Some(authors.into());
        self
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = Some(publisher.into());
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_cover(mut self, cover: FileUpload) -> Self {
        self.cover = Some(cover);
        self
    }

    fn into_fields(self) -> Vec<FormField> {
        let text = |name: &str, value: String| FormField::Text {
            name: name.to_string(),
            value,
        };
        let mut fields = vec![self.book.into_field("book"), text("title", self.title)];
        if let Some(authors) = self.authors {
            fields.push(text("authors", authors));
        }
        if let Some(publisher) = self.publisher {
            fields.push(text("publisher", publisher));
        }
        if let Some(language) = self.language {
            fields.push(text("language", language));
        }
        if let Some(cover) = self.cover {
            fields.push(cover.into_field("cover"));
        }
        fields
    }
}

#[cfg(feature = "admin")]
#[derive(Deserialize)]
struct UploadAccepted {
    book: Book,
}

#[cfg(feature = "admin")]
impl<T: Transport> BooksApi<'_, T> {
    /// Hide a book from listings (or show it again).
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn set_ghost_mode(&self, hash: &BookHash, is_ghost: bool) -> Result<MessageResponse, Error> {
        let request = ApiRequest::post("/books/ghost-mode")
            .json(&serde_json::json!({ "book_hash": hash, "is_ghost": is_ghost }))?;
        self.client.send_json(request).await
    }

    /// Delete a book and its file.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn delete(&self, hash: &BookHash) -> Result<MessageResponse, Error> {
        let request =
            ApiRequest::post("/books/delete").json(&serde_json::json!({ "book_hash": hash }))?;
        self.client.send_json(request).await
    }

    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn update_metadata(
        &self,
        hash: &BookHash,
        update: &MetadataUpdate,
    ) -> Result<MessageResponse, Error> {
        let request = ApiRequest::post("/books/metadata").json(&serde_json::json!({
            "book_hash": hash,
            "title": update.title,
            "authors": update.authors,
            "publisher": update.publisher,
        }))?;
        self.client.send_json(request).await
    }

    /// Upload a book file with its metadata.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn upload(&self, upload: BookUpload) -> Result<Book, Error> {
        let request = ApiRequest::post("/books/upload").multipart(upload.into_fields());
        let accepted: UploadAccepted = self.client.send_json(request).await?;
        tracing::info!(hash = %accepted.book.hash, "Book uploaded");
        Ok(accepted.book)
    }

    /// Replace a book's cover image.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn update_cover(&self, hash: &BookHash, cover: FileUpload) -> Result<MessageResponse, Error> {
        let request = ApiRequest::put(format!("/books/{}/cover", segment(&hash.0)))
            .multipart(vec![cover.into_field("cover")]);
        self.client.send_json(request).await
    }

    /// Re-import book files found in the server's download directories.
    ///
    /// # Errors
    ///
    /// Any [`Error`] from the request.
    pub async fn restore(&self) -> Result<RestoreReport, Error> {
        self.client
            .send_json(ApiRequest::post("/books/restore").empty_object())
            .await
    }
}

fn search_request(
    query: &str,
    search_type: SearchType,
    limit: u32,
    offset: u32,
) -> Result<ApiRequest, Error> {
    #[derive(Serialize)]
    struct Body<'q> {
        query: &'q str,
        limit: u32,
        offset: u32,
        search_type: SearchType,
    }

    ApiRequest::post("/books/search").json(&Body {
        query,
        limit,
        offset,
        search_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::guard::tests::ScriptedTransport;

    fn client(transport: ScriptedTransport) -> MarchiveClient<ScriptedTransport> {
        MarchiveClient::with_transport(
            ClientConfig::new("http://localhost:8080".parse().unwrap()),
            transport,
        )
    }

    const SEARCH: &str = r#"{
        "books": [
            {"hash":"a1","title":"Dune","authors":"Frank Herbert","publisher":"Ace",
             "language":"en","format":"epub","size":"1.2 MB","cover_url":"","cover_data":"",
             "status":"available"}
        ],
        "total": 1,
        "query": "dune",
        "pagination": {"limit":20,"offset":0,"total":1,"has_next":false}
    }"#;

    #[tokio::test]
    async fn search_replaces_snapshot() {
        let transport = ScriptedTransport::new();
        transport.respond("/books/search", 200, SEARCH);
        let client = client(transport);
        let snapshot = client.stores().search_results();

        let results = client.books().search("dune", DEFAULT_SEARCH_LIMIT, 0).await.unwrap();

        assert_eq!(results.books.len(), 1);
        assert!(results.books[0].is_available());
        assert_eq!(snapshot.borrow().as_ref(), Some(&results));
    }

    #[test]
    fn search_body_carries_search_type() {
        use crate::transport::Body;

        let request = search_request("dune", SearchType::Downloaded, 20, 40).unwrap();
        let Body::Json(body) = request.body else {
            panic!("search body is not JSON");
        };
        assert_eq!(
            body,
            serde_json::json!({"query":"dune","limit":20,"offset":40,"search_type":"downloaded"})
        );

        let request = search_request("dune", SearchType::default(), 20, 0).unwrap();
        let Body::Json(body) = request.body else {
            panic!("search body is not JSON");
        };
        assert_eq!(body["search_type"], "all");
    }

    #[tokio::test]
    async fn request_download_tracks_new_job() {
        let transport = ScriptedTransport::new();
        transport.respond(
            "/books/download",
            201,
            r#"{"job_id":"901","status":"pending","message":"Download started"}"#,
        );
        let client = client(transport);

        let job = client
            .books()
            .request_download(&BookHash::from("a1"), "Dune")
            .await
            .unwrap();

        assert_eq!(job.id, JobId::from("901"));
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.title.as_deref(), Some("Dune"));
        assert_eq!(client.stores().job(&job.id), Some(job));
    }

    #[tokio::test]
    async fn job_status_merges_into_tracked_job() {
        let transport = ScriptedTransport::new();
        transport.respond(
            "/books/job/901",
            200,
            r#"{"job_id":"901","status":"downloading","progress":55,"book_hash":"a1","available":false}"#,
        );
        let client = client(transport);
        let tracked = DownloadJob::new(JobId::from("901"), JobStatus::Pending, "a1".into())
            .with_book(&Book::new("a1", "Dune"));
        client.stores().upsert_job(tracked);

        let job = client.books().job_status(&JobId::from("901")).await.unwrap();

        assert_eq!(job.status, JobStatus::Downloading);
        assert_eq!(job.progress, 55);
        assert_eq!(job.title.as_deref(), Some("Dune"));
        assert_eq!(client.stores().job(&job.id).unwrap().progress, 55);
    }

    #[tokio::test]
    async fn poll_job_stops_at_terminal_state() {
        let transport = ScriptedTransport::new();
        transport.respond(
            "/books/job/5",
            200,
            r#"{"job_id":"5","status":"completed","progress":100,"book_hash":"a1","available":true}"#,
        );
        let client = client(transport);

        let policy = PollPolicy {
            interval: Duration::from_millis(1),
            max_polls: 10,
        };
        let job = client.books().poll_job(&JobId::from("5"), policy).await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn poll_job_is_bounded() {
        let transport = ScriptedTransport::new();
        transport.respond(
            "/books/job/6",
            200,
            r#"{"id":6,"status":"processing","progress":10,"book_hash":"a1"}"#,
        );
        let client = client(transport);

        let policy = PollPolicy {
            interval: Duration::from_millis(1),
            max_polls: 3,
        };
        let job = client.books().poll_job(&JobId::from("6"), policy).await.unwrap();

        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn unknown_job_status_is_tolerated() {
        let job: DownloadJob = serde_json::from_str(
            r#"{"id":"1","status":"queued_for_review","book_hash":"x"}"#,
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Unknown);
        assert!(!job.status.is_terminal());
    }

    #[test]
    fn download_url_is_absolute() {
        let client = client(ScriptedTransport::new());
        let url = client.books().download_url(&BookHash::from("a1")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/books/a1/download");
    }

    #[test]
    fn download_request_skips_empty_metadata() {
        let mut book = Book::new("a1", "Dune");
        book.authors = "Frank Herbert".into();
        let json = serde_json::to_value(DownloadRequest::for_book(&book)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"hash":"a1","title":"Dune","authors":"Frank Herbert"})
        );
    }

    #[cfg(feature = "admin")]
    #[tokio::test]
    async fn restore_reports_counts() {
        let transport = ScriptedTransport::new();
        transport.respond(
            "/books/restore",
            200,
            r#"{"restored":4,"skipped":2,"errors":null,"message":"Restore completed"}"#,
        );
        let client = client(transport);

        let report = client.books().restore().await.unwrap();

        assert_eq!(report.restored, 4);
        assert_eq!(report.skipped, 2);
        assert!(report.errors.is_none());
    }

    #[cfg(feature = "admin")]
    #[test]
    fn upload_fields_include_optional_parts() {
        let upload = BookUpload::new(FileUpload::new("dune.epub", b"PK".to_vec()), "Dune")
            .with_authors("Frank Herbert")
            .with_cover(FileUpload::new("cover.jpg", b"\xff\xd8".to_vec()).with_mime("image/jpeg"));
        let names: Vec<_> = upload
            .into_fields()
            .into_iter()
            .map(|f| match f {
                FormField::Text { name, .. } | FormField::File { name, .. } => name,
            })
            .collect();
        assert_eq!(names, ["book", "title", "authors", "cover"]);
    }
}
