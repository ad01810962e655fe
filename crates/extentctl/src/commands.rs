//! CLI command implementations

use std::path::Path;

use anyhow::{bail, Context, Result};
use extent::{ExtentHash, ExtentRecipe};
use extentproto::ExtentSession;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Store the file at `path` and return its recipe.
pub async fn write<S>(session: &ExtentSession<S>, path: &Path) -> Result<ExtentRecipe>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let recipe = session
        .try_write_file(&content)
        .await
        .with_context(|| format!("Failed to store {}", path.display()))?;
    tracing::info!(file = %path.display(), bytes = content.len(), extents = recipe.len(), "stored");
    Ok(recipe)
}

/// Load a recipe from a JSON file, or from stdin when `source` is `-`.
pub async fn load_recipe(source: &str) -> Result<ExtentRecipe> {
    let text = if source == "-" {
        let mut text = String::new();
        tokio::io::stdin()
            .read_to_string(&mut text)
            .await
            .context("Failed to read recipe from stdin")?;
        text
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read recipe {source}"))?
    };
    parse_recipe(&text)
}

/// Parse a recipe: a JSON array of extent hashes.
pub fn parse_recipe(text: &str) -> Result<ExtentRecipe> {
    let raw: Vec<String> = serde_json::from_str(text.trim())
        .context("Recipe must be a JSON array of extent hashes")?;
    let hashes = raw
        .iter()
        .map(|h| ExtentHash::from_str_checked(h).with_context(|| format!("Bad hash in recipe: {h}")))
        .collect::<Result<Vec<_>>>()?;
    Ok(ExtentRecipe::new(hashes))
}

/// Fetch the content of `recipe` and write it to `out`.
pub async fn read<S, W>(session: &ExtentSession<S>, recipe: &ExtentRecipe, out: &mut W) -> Result<usize>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let content = session
        .try_read_file(recipe)
        .await
        .with_context(|| format!("Failed to read {recipe}"))?;
    out.write_all(&content).await?;
    out.flush().await?;
    Ok(content.len())
}

/// Whether the server holds `hash`.
pub async fn poll<S>(session: &ExtentSession<S>, hash: &str) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hash = match ExtentHash::from_str_checked(hash) {
        Ok(hash) => hash,
        Err(e) => bail!("Invalid extent hash '{hash}': {e}"),
    };
    Ok(session.poll_extent(&hash).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_recipe_accepts_hash_arrays() {
        let a = ExtentHash::of(b"a");
        let b = ExtentHash::of(b"b");
        let text = format!("[\"{a}\", \"{b}\"]\n");

        let recipe = parse_recipe(&text).unwrap();
        assert_eq!(recipe.hashes(), &[a, b]);
        assert!(parse_recipe("[]").unwrap().is_empty());
    }

    #[test]
    fn parse_recipe_rejects_garbage() {
        assert!(parse_recipe("not json").is_err());
        assert!(parse_recipe("[\"tooshort\"]").is_err());
        assert!(parse_recipe("{\"a\": 1}").is_err());
    }
}
